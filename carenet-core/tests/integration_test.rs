/// Integration tests: composite reads over real HTTP dependencies.

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::{Path, State},
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use carenet_core::config::{DependencyConfig, DEPARTMENT_SERVICE, PATIENT_SERVICE};
    use carenet_core::resilience::CircuitState;
    use carenet_core::{CarenetService, Config, ServiceRole};
    use serde_json::{json, Value};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    /// Stand-in for a dependency: answers child listings from a fixed map.
    #[derive(Clone, Default)]
    struct FakeDependency {
        calls: Arc<AtomicUsize>,
        children: Arc<HashMap<i64, Value>>,
        slow: Arc<HashSet<i64>>,
        failing: bool,
    }

    impl FakeDependency {
        fn new(children: Vec<(i64, Value)>) -> Self {
            Self {
                children: Arc::new(children.into_iter().collect()),
                ..Self::default()
            }
        }

        fn slow_for(mut self, keys: &[i64]) -> Self {
            self.slow = Arc::new(keys.iter().copied().collect());
            self
        }

        fn failing(mut self) -> Self {
            self.failing = true;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    async fn children(State(fake): State<FakeDependency>, Path(id): Path<i64>) -> Response {
        fake.calls.fetch_add(1, Ordering::SeqCst);
        if fake.failing {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        if fake.slow.contains(&id) {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        Json(fake.children.get(&id).cloned().unwrap_or_else(|| json!([]))).into_response()
    }

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn spawn_fake(paths: &[&str], fake: FakeDependency) -> String {
        let mut app = Router::new();
        for path in paths {
            app = app.route(path, get(children));
        }
        serve(app.with_state(fake)).await
    }

    /// A base URL nothing listens on.
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    fn dependency(base_url: &str, failure_threshold: u32) -> DependencyConfig {
        let mut dep = DependencyConfig::new(base_url);
        dep.timeout_ms = 300;
        dep.breaker.failure_threshold = failure_threshold;
        dep
    }

    fn config(role: ServiceRole, departments_url: &str, patients_url: &str, threshold: u32) -> Config {
        let mut config = Config::default();
        config.service.role = role;
        config
            .dependencies
            .insert(DEPARTMENT_SERVICE.to_string(), dependency(departments_url, threshold));
        config
            .dependencies
            .insert(PATIENT_SERVICE.to_string(), dependency(patients_url, threshold));
        config
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn seed_hospitals(router: &Router) {
        for hospital in [
            json!({"hospitalId": 7, "name": "St. Mary", "address": "1 Main St"}),
            json!({"hospitalId": 9, "name": "North"}),
        ] {
            let (status, _) = send(router, "POST", "/hospitals", Some(hospital)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    fn department(id: i64, name: &str, hospital: i64) -> Value {
        json!({"departmentId": id, "name": name, "hospitalId": hospital})
    }

    fn patient(id: i64, name: &str, department: i64, hospital: i64) -> Value {
        json!({"patientId": id, "name": name, "departmentId": department, "hospitalId": hospital})
    }

    fn department_fake() -> FakeDependency {
        FakeDependency::new(vec![(
            7,
            json!([department(101, "Cardiology", 7), department(102, "Radiology", 7)]),
        )])
    }

    fn patient_fake() -> FakeDependency {
        FakeDependency::new(vec![
            (101, json!([patient(1, "P1", 101, 7), patient(2, "P2", 101, 7)])),
            (102, json!([patient(3, "P3", 102, 7)])),
        ])
    }

    #[tokio::test]
    async fn test_depth_two_with_slow_patient_lookup() {
        let departments = department_fake();
        let patients = patient_fake().slow_for(&[102]);
        let config = config(
            ServiceRole::Hospital,
            &spawn_fake(&["/departments/hospital/:id"], departments.clone()).await,
            &spawn_fake(&["/patients/department/:id"], patients.clone()).await,
            5,
        );
        let service = CarenetService::build(&config).await.unwrap();
        let router = service.router();
        seed_hospitals(&router).await;

        let (status, body) = send(&router, "GET", "/hospitals/7/with-children?depth=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hospitalId"], 7);
        assert_eq!(body["name"], "St. Mary");
        assert!(body.get("patientList").is_none());

        let list = body["departmentList"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["departmentId"], 101);
        let names: Vec<&str> = list[0]["patientList"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["P1", "P2"]);
        assert_eq!(list[1]["departmentId"], 102);
        assert_eq!(list[1]["patientList"], json!([]));

        assert_eq!(departments.calls(), 1);
        assert_eq!(patients.calls(), 2);
        assert_eq!(service.metrics().calls(PATIENT_SERVICE, "timeout"), 1);
    }

    #[tokio::test]
    async fn test_unknown_hospital_makes_no_dependency_calls() {
        let departments = department_fake();
        let patients = patient_fake();
        let config = config(
            ServiceRole::Hospital,
            &spawn_fake(&["/departments/hospital/:id"], departments.clone()).await,
            &spawn_fake(&["/patients/department/:id"], patients.clone()).await,
            5,
        );
        let router = CarenetService::build(&config).await.unwrap().router();
        seed_hospitals(&router).await;

        let (status, body) = send(&router, "GET", "/hospitals/42/with-children?depth=2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert_eq!(departments.calls(), 0);
        assert_eq!(patients.calls(), 0);

        let (status, _) = send(&router, "GET", "/hospitals/7/with-children?depth=3", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&router, "GET", "/hospitals/-1/with-departments", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(departments.calls(), 0);
    }

    #[tokio::test]
    async fn test_hospital_without_departments() {
        let config = config(
            ServiceRole::Hospital,
            &spawn_fake(&["/departments/hospital/:id"], department_fake()).await,
            &spawn_fake(&["/patients/department/:id"], patient_fake()).await,
            5,
        );
        let router = CarenetService::build(&config).await.unwrap().router();
        seed_hospitals(&router).await;

        let (status, body) = send(&router, "GET", "/hospitals/9/with-departments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "North");
        assert_eq!(body["departmentList"], json!([]));
    }

    #[tokio::test]
    async fn test_dependencies_down_still_answers() {
        let config = config(
            ServiceRole::Hospital,
            &closed_port().await,
            &closed_port().await,
            5,
        );
        let service = CarenetService::build(&config).await.unwrap();
        let router = service.router();
        seed_hospitals(&router).await;

        let (status, body) = send(&router, "GET", "/hospitals/7/with-departments-and-patients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], "1 Main St");
        assert_eq!(body["departmentList"], json!([]));

        let (status, body) = send(&router, "GET", "/hospitals/7/with-patients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["patientList"], json!([]));
        assert_eq!(service.metrics().calls(DEPARTMENT_SERVICE, "unavailable"), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_network() {
        let departments = department_fake().failing();
        let config = config(
            ServiceRole::Hospital,
            &spawn_fake(&["/departments/hospital/:id"], departments.clone()).await,
            &spawn_fake(&["/patients/department/:id"], patient_fake()).await,
            2,
        );
        let service = CarenetService::build(&config).await.unwrap();
        let router = service.router();
        seed_hospitals(&router).await;

        for _ in 0..3 {
            let (status, body) = send(&router, "GET", "/hospitals/7/with-departments", None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["departmentList"], json!([]));
        }

        assert_eq!(departments.calls(), 2);
        let breaker = service.breaker(DEPARTMENT_SERVICE).unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(service.metrics().calls(DEPARTMENT_SERVICE, "short_circuit"), 1);

        let (status, health) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["dependencies"][DEPARTMENT_SERVICE], "open");
        assert_eq!(health["dependencies"][PATIENT_SERVICE], "closed");
    }

    #[tokio::test]
    async fn test_hospital_crud() {
        let url = closed_port().await;
        let router = CarenetService::build(&config(ServiceRole::Hospital, &url, &url, 5))
            .await
            .unwrap()
            .router();
        seed_hospitals(&router).await;

        let (status, _) = send(
            &router,
            "POST",
            "/hospitals",
            Some(json!({"hospitalId": 7, "name": "Duplicate"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &router,
            "PUT",
            "/hospitals/7",
            Some(json!({"hospitalId": 8, "name": "Moved"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            "PUT",
            "/hospitals/77",
            Some(json!({"hospitalId": 77, "name": "Ghost"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &router,
            "PATCH",
            "/hospitals/7",
            Some(json!({"name": "St. Mary General", "address": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "St. Mary General");
        assert!(body["address"].is_null());

        let (status, _) = send(&router, "PATCH", "/hospitals/7", Some(json!({"name": null}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&router, "PATCH", "/hospitals/7", Some(json!({"beds": 12}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, "GET", "/hospitals", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (status, _) = send(&router, "DELETE", "/hospitals/9", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, "GET", "/hospitals/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_positive_foreign_keys_are_rejected() {
        let url = closed_port().await;
        let router = CarenetService::build(&config(ServiceRole::Department, &url, &url, 5))
            .await
            .unwrap()
            .router();

        let (status, _) = send(&router, "POST", "/departments", Some(department(101, "Cardiology", 0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send(&router, "GET", "/departments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, _) = send(&router, "POST", "/departments", Some(department(101, "Cardiology", 7))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(&router, "PUT", "/departments/101", Some(department(101, "Cardiology", -4))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&router, "PATCH", "/departments/101", Some(json!({"hospitalId": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&router, "GET", "/departments/101", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hospitalId"], 7);
    }

    #[tokio::test]
    async fn test_three_roles_end_to_end() {
        let unused = closed_port().await;

        let patient_service =
            CarenetService::build(&config(ServiceRole::Patient, &unused, &unused, 5)).await.unwrap();
        let patient_router = patient_service.router();
        for p in [
            patient(1, "P1", 101, 7),
            patient(2, "P2", 101, 7),
            patient(3, "P3", 201, 8),
        ] {
            let (status, _) = send(&patient_router, "POST", "/patients", Some(p)).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let patients_url = serve(patient_router).await;

        let department_service =
            CarenetService::build(&config(ServiceRole::Department, &unused, &patients_url, 5))
                .await
                .unwrap();
        let department_router = department_service.router();
        for d in [
            department(101, "Cardiology", 7),
            department(102, "Radiology", 7),
            department(201, "Oncology", 8),
        ] {
            let (status, _) = send(&department_router, "POST", "/departments", Some(d)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) =
            send(&department_router, "GET", "/departments/hospital/7/with-patients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["patientList"].as_array().unwrap().len(), 2);
        assert_eq!(body[1]["patientList"], json!([]));

        let (status, _) =
            send(&department_router, "GET", "/departments/101/with-children?depth=2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let departments_url = serve(department_router).await;
        let hospital_service = CarenetService::build(&config(
            ServiceRole::Hospital,
            &departments_url,
            &patients_url,
            5,
        ))
        .await
        .unwrap();
        let router = hospital_service.router();
        seed_hospitals(&router).await;

        let (status, body) = send(&router, "GET", "/hospitals/7/with-children?depth=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body["departmentList"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["patientList"].as_array().unwrap().len(), 2);
        assert_eq!(list[1]["patientList"], json!([]));

        let (status, body) = send(&router, "GET", "/hospitals/7/with-patients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["patientList"].as_array().unwrap().len(), 2);
        assert!(body.get("departmentList").is_none());

        let (status, body) = send(&router, "GET", "/hospitals/with-departments", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["departmentList"].as_array().unwrap().len(), 2);
        assert_eq!(body[1]["departmentList"], json!([]));

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("carenet_composite_requests_total"));
        assert!(text.contains("carenet_dependency_calls_total"));
    }
}
