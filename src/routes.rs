use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::{
    self, require_admin, require_profile, require_token, AuthenticatedToken, CurrentUser,
    LoginRequest, RefreshRequest, RegisterRequest, UserView,
};
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::models::{
    AcademicRecord, DashboardStats, InterventionUpdate, NewAcademicRecord, NewAttendance,
    NewFinancialRecord, NewIntervention, NewPrediction, NewStudent, Prediction, RiskLevel,
    Student, StudentUpdate,
};
use crate::records;
use crate::risk::{self, AttendanceSummary};
use crate::state::AppState;

const RECENT_PREDICTIONS_ON_DASHBOARD: usize = 5;
const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 100;

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler));

    let token_only = Router::new()
        .route("/auth/logout", post(logout_handler))
        .route_layer(from_fn_with_state(state.clone(), require_token));

    let protected = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/dashboard/stats", get(dashboard_stats_handler))
        .route("/dashboard/high-risk-students", get(high_risk_students_handler))
        .route("/dashboard/recent-predictions", get(recent_predictions_handler))
        .route("/dashboard/risk-distribution", get(risk_distribution_handler))
        .route("/students", get(list_students_handler).post(create_student_handler))
        .route(
            "/students/:id",
            get(get_student_handler).patch(update_student_handler),
        )
        .route(
            "/students/:id/attendance",
            get(list_attendance_handler).post(record_attendance_handler),
        )
        .route(
            "/students/:id/academic-records",
            get(list_academic_records_handler).post(add_academic_record_handler),
        )
        .route(
            "/students/:id/predictions",
            get(list_predictions_handler).post(save_prediction_handler),
        )
        .route(
            "/students/:id/interventions",
            get(list_interventions_handler).post(create_intervention_handler),
        )
        .route("/interventions/:id", patch(update_intervention_handler))
        .route(
            "/students/:id/financial-records",
            get(list_financial_records_handler).post(add_financial_record_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), require_profile));

    let admin = Router::new()
        .route("/profiles/:id", delete(revoke_profile_handler))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_profile));

    let api = public.merge(token_only).merge(protected).merge(admin);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        .fallback(not_found_handler)
        .with_state(state)
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Student Dropout Risk Tracker API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = auth::register(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(auth::login(&state, request).await?))
}

async fn refresh_handler(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(auth::refresh(&state, request).await?))
}

async fn logout_handler(
    State(state): State<AppState>,
    authenticated: AuthenticatedToken,
) -> Result<impl IntoResponse, ApiError> {
    state.identity.sign_out(&authenticated.token).await?;
    info!(user_id = %authenticated.user.id, "logged out");
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

async fn me_handler(current: CurrentUser) -> Json<UserView> {
    Json(UserView::from(&current.profile))
}

async fn dashboard_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, ApiError> {
    let students = state.store.list_students(false).await?;
    let recent_predictions = state
        .store
        .recent_predictions(RECENT_PREDICTIONS_ON_DASHBOARD)
        .await?;
    let active_interventions = state.store.count_active_interventions().await?;

    Ok(Json(DashboardStats {
        students: risk::summarize_students(&students),
        recent_predictions,
        active_interventions,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
struct HighRiskStudent {
    id: Uuid,
    name: String,
    roll_number: String,
    risk_level: RiskLevel,
    risk_score: f64,
    gpa: Option<f64>,
    /// Attendance percentage over all recorded classes.
    attendance: f64,
    prediction_date: Option<DateTime<Utc>>,
}

async fn high_risk_students_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<HighRiskStudent>>, ApiError> {
    let students = state.store.high_risk_students().await?;
    let mut listed = Vec::with_capacity(students.len());
    for s in students {
        let attendance = state.store.student_attendance(s.id).await?;
        listed.push(HighRiskStudent {
            id: s.id,
            name: s.name,
            roll_number: s.roll_number,
            risk_level: s.risk_level,
            risk_score: s.risk_score,
            gpa: s.current_gpa,
            attendance: risk::summarize_attendance(&attendance).attendance_percentage,
            prediction_date: s.last_prediction_date,
        });
    }
    Ok(Json(listed))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Serialize)]
struct RecentPrediction {
    #[serde(flatten)]
    prediction: Prediction,
    student_name: Option<String>,
}

async fn recent_predictions_handler(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RecentPrediction>>, ApiError> {
    let predictions = state.store.recent_predictions(query.resolve()).await?;
    let names: HashMap<Uuid, String> = state
        .store
        .list_students(false)
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    Ok(Json(
        predictions
            .into_iter()
            .map(|prediction| RecentPrediction {
                student_name: names.get(&prediction.student_id).cloned(),
                prediction,
            })
            .collect(),
    ))
}

async fn risk_distribution_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let students = state.store.list_students(true).await?;
    Ok(Json(risk::risk_distribution(&students)))
}

#[derive(Debug, Deserialize)]
struct ListStudentsQuery {
    active_only: Option<bool>,
}

async fn list_students_handler(
    State(state): State<AppState>,
    Query(query): Query<ListStudentsQuery>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let active_only = query.active_only.unwrap_or(true);
    Ok(Json(state.store.list_students(active_only).await?))
}

async fn create_student_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(student): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
    let created = records::create_student(state.store.as_ref(), student).await?;
    info!(student_id = %created.id, created_by = %current.profile.id, "student created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Serialize)]
struct StudentDetail {
    #[serde(flatten)]
    student: Student,
    attendance: AttendanceSummary,
    average_marks_percentage: Option<f64>,
    latest_prediction: Option<Prediction>,
    prediction_history: Vec<Prediction>,
}

async fn get_student_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StudentDetail>, ApiError> {
    let student = records::require_student(state.store.as_ref(), id).await?;
    let attendance = state.store.student_attendance(id).await?;
    let academic: Vec<AcademicRecord> = state.store.student_academic_records(id).await?;
    let prediction_history = state
        .store
        .student_predictions(id, DEFAULT_HISTORY_LIMIT)
        .await?;
    let latest_prediction = state.store.latest_prediction(id).await?;

    Ok(Json(StudentDetail {
        student,
        attendance: risk::summarize_attendance(&attendance),
        average_marks_percentage: risk::average_marks_percentage(&academic),
        latest_prediction,
        prediction_history,
    }))
}

async fn update_student_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StudentUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        records::update_student(state.store.as_ref(), id, update).await?,
    ))
}

async fn list_attendance_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    records::require_student(state.store.as_ref(), id).await?;
    Ok(Json(state.store.student_attendance(id).await?))
}

async fn record_attendance_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(attendance): Json<NewAttendance>,
) -> Result<impl IntoResponse, ApiError> {
    let record = records::record_attendance(state.store.as_ref(), id, attendance).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_academic_records_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    records::require_student(state.store.as_ref(), id).await?;
    Ok(Json(state.store.student_academic_records(id).await?))
}

async fn add_academic_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(record): Json<NewAcademicRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let record = records::add_academic_record(state.store.as_ref(), id, record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_predictions_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    records::require_student(state.store.as_ref(), id).await?;
    Ok(Json(
        state.store.student_predictions(id, query.resolve()).await?,
    ))
}

async fn save_prediction_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(prediction): Json<NewPrediction>,
) -> Result<impl IntoResponse, ApiError> {
    let saved = records::save_prediction(state.store.as_ref(), id, prediction).await?;
    info!(student_id = %id, risk_level = %saved.risk_level, "prediction saved");
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn list_interventions_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    records::require_student(state.store.as_ref(), id).await?;
    Ok(Json(state.store.student_interventions(id).await?))
}

async fn create_intervention_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(intervention): Json<NewIntervention>,
) -> Result<impl IntoResponse, ApiError> {
    let created = records::create_intervention(state.store.as_ref(), id, intervention).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_intervention_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<InterventionUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.update_intervention(id, &update).await?))
}

async fn list_financial_records_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    records::require_student(state.store.as_ref(), id).await?;
    Ok(Json(state.store.student_financial_records(id).await?))
}

async fn add_financial_record_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(record): Json<NewFinancialRecord>,
) -> Result<impl IntoResponse, ApiError> {
    let record = records::add_financial_record(state.store.as_ref(), id, record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn revoke_profile_handler(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.store.delete_profile(id).await? {
        return Err(ApiError::NotFound("profile not found".to_string()));
    }
    info!(profile_id = %id, revoked_by = %current.profile.id, "profile revoked");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::identity::{
        IdentityError, IdentityProvider, IdentityResult, IdentityUser, Session, SignInOutcome,
        SignUpOutcome,
    };
    use crate::models::{Profile, Role};
    use crate::store::{MemoryStore, Store};

    /// Identity provider keeping accounts and live tokens in memory.
    #[derive(Default)]
    struct FakeIdentity {
        accounts: Mutex<HashMap<String, (String, Uuid)>>,
        tokens: Mutex<HashMap<String, Uuid>>,
    }

    impl FakeIdentity {
        fn issue(&self, id: Uuid) -> Session {
            let access_token = format!("at-{}", Uuid::new_v4());
            self.tokens.lock().unwrap().insert(access_token.clone(), id);
            Session {
                access_token,
                refresh_token: format!("rt-{id}"),
                expires_in: Some(3600),
            }
        }

        fn rejected(status: u16, message: &str) -> IdentityError {
            IdentityError::Rejected {
                status,
                message: message.to_string(),
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<SignUpOutcome> {
            let id = Uuid::new_v4();
            {
                let mut accounts = self.accounts.lock().unwrap();
                if accounts.contains_key(email) {
                    return Err(Self::rejected(422, "User already registered"));
                }
                accounts.insert(email.to_string(), (password.to_string(), id));
            }
            Ok(SignUpOutcome {
                user: IdentityUser {
                    id,
                    email: Some(email.to_string()),
                },
                session: Some(self.issue(id)),
            })
        }

        async fn sign_in_with_password(
            &self,
            email: &str,
            password: &str,
        ) -> IdentityResult<SignInOutcome> {
            let account = self.accounts.lock().unwrap().get(email).cloned();
            match account {
                Some((stored, id)) if stored == password => Ok(SignInOutcome {
                    user: IdentityUser {
                        id,
                        email: Some(email.to_string()),
                    },
                    session: self.issue(id),
                }),
                _ => Err(Self::rejected(400, "Invalid login credentials")),
            }
        }

        async fn get_user(&self, access_token: &str) -> IdentityResult<IdentityUser> {
            self.tokens
                .lock()
                .unwrap()
                .get(access_token)
                .map(|id| IdentityUser { id: *id, email: None })
                .ok_or_else(|| Self::rejected(401, "invalid JWT"))
        }

        async fn refresh_session(&self, refresh_token: &str) -> IdentityResult<Session> {
            let id = refresh_token
                .strip_prefix("rt-")
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .ok_or_else(|| Self::rejected(400, "Invalid Refresh Token"))?;
            Ok(self.issue(id))
        }

        async fn sign_out(&self, access_token: &str) -> IdentityResult<()> {
            self.tokens.lock().unwrap().remove(access_token);
            Ok(())
        }
    }

    struct Harness {
        app: Router,
        identity: Arc<FakeIdentity>,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            let identity = Arc::new(FakeIdentity::default());
            let store = Arc::new(MemoryStore::new());
            let app = router(AppState::new(identity.clone(), store.clone()));
            Self {
                app,
                identity,
                store,
            }
        }

        async fn send(
            &self,
            method: &str,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => request
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }

        /// Registers a teacher and returns (user id, access token).
        async fn register(&self, email: &str) -> (Uuid, String) {
            let (status, body) = self
                .send(
                    "POST",
                    "/api/v1/auth/register",
                    None,
                    Some(json!({
                        "email": email,
                        "password": "correct horse",
                        "full_name": "Tess Teacher",
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            let id = Uuid::parse_str(body["user"]["id"].as_str().unwrap()).unwrap();
            let token = body["session"]["access_token"].as_str().unwrap().to_string();
            (id, token)
        }

        async fn create_student(&self, token: &str, roll_number: &str) -> (StatusCode, Value) {
            self.send(
                "POST",
                "/api/v1/students",
                Some(token),
                Some(json!({
                    "name": "Avery Lee",
                    "roll_number": roll_number,
                    "email": "avery.lee@example.edu",
                    "program": "Computer Science",
                    "semester": 3,
                    "current_gpa": 6.1,
                })),
            )
            .await
        }
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_unauthenticated() {
        let harness = Harness::new();

        let (status, body) = harness.send("GET", "/api/v1/students", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authorization header missing");

        let request = Request::builder()
            .uri("/api/v1/students")
            .header(AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap();
        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let harness = Harness::new();
        let (status, body) = harness
            .send("GET", "/api/v1/dashboard/stats", Some("forged"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn valid_token_without_profile_is_forbidden() {
        let harness = Harness::new();
        let outcome = harness
            .identity
            .sign_up("orphan@example.edu", "secret123")
            .await
            .unwrap();
        let token = outcome.session.unwrap().access_token;

        let (status, body) = harness.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
    }

    #[tokio::test]
    async fn deleting_profile_revokes_a_still_valid_token() {
        let harness = Harness::new();
        let (id, token) = harness.register("tess@example.edu").await;

        let (status, body) = harness.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "tess@example.edu");

        assert!(harness.store.delete_profile(id).await.unwrap());

        let (status, _) = harness.send("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness.send("GET", "/api/v1/students", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = harness
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "tess@example.edu", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthenticated() {
        let harness = Harness::new();
        harness.register("tess@example.edu").await;

        let (status, _) = harness
            .send(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "tess@example.edu", "password": "nope-nope" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_bad_request() {
        let harness = Harness::new();
        harness.register("tess@example.edu").await;

        let (status, body) = harness
            .send(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "email": "tess@example.edu",
                    "password": "correct horse",
                    "full_name": "Tess Again",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already registered");
    }

    #[tokio::test]
    async fn logout_only_needs_a_valid_token() {
        let harness = Harness::new();
        let (id, token) = harness.register("tess@example.edu").await;
        harness.store.delete_profile(id).await.unwrap();

        let (status, _) = harness
            .send("POST", "/api/v1/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = harness
            .send("POST", "/api/v1/auth/logout", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_issues_a_usable_token() {
        let harness = Harness::new();
        let (id, _) = harness.register("tess@example.edu").await;

        let (status, body) = harness
            .send(
                "POST",
                "/api/v1/auth/refresh",
                None,
                Some(json!({ "refresh_token": format!("rt-{id}") })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["access_token"].as_str().unwrap();

        let (status, _) = harness.send("GET", "/api/v1/auth/me", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn duplicate_roll_number_is_a_conflict() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;

        let (status, _) = harness.create_student(&token, "CS2021001").await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = harness.create_student(&token, "CS2021001").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn prediction_updates_student_risk_snapshot() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;
        let (_, student) = harness.create_student(&token, "CS2021002").await;
        let student_id = student["id"].as_str().unwrap();

        let (status, prediction) = harness
            .send(
                "POST",
                &format!("/api/v1/students/{student_id}/predictions"),
                Some(&token),
                Some(json!({ "risk_level": "high", "risk_score": 0.85, "confidence": 0.9 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, detail) = harness
            .send("GET", &format!("/api/v1/students/{student_id}"), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["risk_level"], prediction["risk_level"]);
        assert_eq!(detail["risk_score"], prediction["risk_score"]);
        assert_eq!(detail["prediction_history"].as_array().unwrap().len(), 1);
        assert_eq!(detail["latest_prediction"]["id"], prediction["id"]);

        let (status, _) = harness
            .send(
                "POST",
                &format!("/api/v1/students/{student_id}/attendance"),
                Some(&token),
                Some(json!({ "date": "2026-09-01", "subject": "Algorithms", "status": "present" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        harness
            .send(
                "POST",
                &format!("/api/v1/students/{student_id}/attendance"),
                Some(&token),
                Some(json!({ "date": "2026-09-02", "subject": "Algorithms", "status": "absent" })),
            )
            .await;

        let (_, high_risk) = harness
            .send("GET", "/api/v1/dashboard/high-risk-students", Some(&token), None)
            .await;
        assert_eq!(high_risk[0]["roll_number"], "CS2021002");
        assert_eq!(high_risk[0]["attendance"], 50.0);
    }

    #[tokio::test]
    async fn dashboard_stats_reflect_live_records() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;
        let (_, first) = harness.create_student(&token, "CS1").await;
        harness.create_student(&token, "CS2").await;
        let first_id = first["id"].as_str().unwrap();

        harness
            .send(
                "POST",
                &format!("/api/v1/students/{first_id}/predictions"),
                Some(&token),
                Some(json!({ "risk_level": "medium", "risk_score": 0.5 })),
            )
            .await;
        let (status, _) = harness
            .send(
                "POST",
                &format!("/api/v1/students/{first_id}/interventions"),
                Some(&token),
                Some(json!({ "intervention_type": "counseling", "description": "Weekly check-in" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, stats) = harness
            .send("GET", "/api/v1/dashboard/stats", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_students"], 2);
        assert_eq!(stats["medium_risk_students"], 1);
        assert_eq!(stats["low_risk_students"], 1);
        assert_eq!(stats["active_interventions"], 1);
        assert_eq!(stats["recent_predictions"].as_array().unwrap().len(), 1);

        let (_, distribution) = harness
            .send("GET", "/api/v1/dashboard/risk-distribution", Some(&token), None)
            .await;
        assert_eq!(distribution, json!({ "low": 1, "medium": 1, "high": 0 }));
    }

    #[tokio::test]
    async fn attendance_for_unknown_student_is_not_found() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;

        let (status, _) = harness
            .send(
                "POST",
                &format!("/api/v1/students/{}/attendance", Uuid::new_v4()),
                Some(&token),
                Some(json!({ "date": "2026-09-01", "subject": "Algorithms", "status": "present" })),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn only_admins_can_revoke_profiles() {
        let harness = Harness::new();
        let (teacher_id, teacher_token) = harness.register("tess@example.edu").await;
        let (admin_id, admin_token) = harness.register("ada@example.edu").await;

        let uri = format!("/api/v1/profiles/{teacher_id}");
        let (status, _) = harness.send("DELETE", &uri, Some(&teacher_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = harness.store.get_profile(admin_id).await.unwrap().unwrap();
        harness
            .store
            .upsert_profile(&Profile {
                role: Role::Admin,
                ..admin
            })
            .await
            .unwrap();

        let (status, _) = harness.send("DELETE", &uri, Some(&admin_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = harness
            .send("GET", "/api/v1/auth/me", Some(&teacher_token), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_student_id_is_a_json_bad_request() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;

        let (status, body) = harness
            .send("GET", "/api/v1/students/not-a-uuid", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn incomplete_or_broken_json_is_a_bad_request() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;

        let (status, body) = harness
            .send("POST", "/api/v1/students", Some(&token), Some(json!({ "name": "x" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/students")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let response = harness.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn bad_query_parameters_are_a_bad_request() {
        let harness = Harness::new();
        let (_, token) = harness.register("tess@example.edu").await;

        let (status, body) = harness
            .send("GET", "/api/v1/students?active_only=maybe", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn unknown_route_is_a_json_not_found() {
        let harness = Harness::new();

        for uri in ["/api/v1/nope", "/nope"] {
            let (status, body) = harness.send("GET", uri, None, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"], "not_found");
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let harness = Harness::new();
        let (status, body) = harness.send("GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }
}
