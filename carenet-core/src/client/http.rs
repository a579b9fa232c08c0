use super::RemoteLookup;
use crate::error::{CarenetError, Result};
use crate::model::{Entity, EntityKey};
use async_trait::async_trait;
use reqwest::Client;
use std::marker::PhantomData;
use std::time::Duration;

/// `GET {base_url}{path}` where `path` contains an `{id}` placeholder,
/// expecting a JSON array of children.
pub struct HttpLookup<P, C> {
    name: String,
    client: Client,
    base_url: String,
    path: String,
    timeout: Duration,
    _types: PhantomData<fn(P) -> C>,
}

impl<P, C> HttpLookup<P, C> {
    pub fn new(
        name: impl Into<String>,
        client: Client,
        base_url: impl Into<String>,
        path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            path: path.into(),
            timeout,
            _types: PhantomData,
        }
    }

    pub fn url_for(&self, parent: impl std::fmt::Display) -> String {
        format!("{}{}", self.base_url, self.path.replace("{id}", &parent.to_string()))
    }

    fn classify(&self, err: reqwest::Error) -> CarenetError {
        if err.is_timeout() {
            CarenetError::DependencyTimeout {
                dependency: self.name.clone(),
                timeout: self.timeout,
            }
        } else {
            CarenetError::unavailable(&self.name, err)
        }
    }
}

#[async_trait]
impl<P, C> RemoteLookup for HttpLookup<P, C>
where
    P: EntityKey,
    C: Entity,
{
    type Parent = P;
    type Child = C;

    fn dependency(&self) -> &str {
        &self.name
    }

    async fn fetch_children(&self, parent: P) -> Result<Vec<C>> {
        let url = self.url_for(parent);
        tracing::trace!(dependency = %self.name, %url, "fetching children");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CarenetError::unavailable(
                &self.name,
                format!("{} returned {}", url, status),
            ));
        }

        response.json::<Vec<C>>().await.map_err(|e| self.classify(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HospitalId, Department};

    #[test]
    fn test_url_for() {
        let lookup: HttpLookup<HospitalId, Department> = HttpLookup::new(
            "department-service",
            Client::new(),
            "http://departments.local:8082/",
            "/departments/hospital/{id}",
            Duration::from_secs(1),
        );
        assert_eq!(
            lookup.url_for(HospitalId(7)),
            "http://departments.local:8082/departments/hospital/7"
        );
    }
}
