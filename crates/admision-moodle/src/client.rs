//! Moodle REST web-service client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use admision_core::model::{Attempt, AttemptReview, Mark, Quiz, ReviewedQuestion, Student};
use admision_core::traits::{role_matches, GradingSource};

use crate::config::MoodleSettings;
use crate::error::MoodleError;

const WS_PATH: &str = "webservice/rest/server.php";
const MAX_BACKOFF_MS: u64 = 10_000;

/// Client for `webservice/rest/server.php` with token authentication.
pub struct MoodleClient {
    base_url: String,
    token: String,
    timeout_secs: u64,
    max_retries: u32,
    retry_backoff_ms: u64,
    client: reqwest::Client,
}

impl MoodleClient {
    pub fn new(settings: &MoodleSettings) -> Result<Self, MoodleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| MoodleError::Config(e.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            timeout_secs: settings.timeout_secs,
            max_retries: settings.max_retries,
            retry_backoff_ms: settings.retry_backoff_ms,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, WS_PATH)
    }

    /// Call a web-service function and decode its JSON answer.
    ///
    /// Transient failures are retried with exponential backoff.
    #[instrument(skip(self, params), fields(wsfunction = %wsfunction))]
    pub async fn call<T: DeserializeOwned>(
        &self,
        wsfunction: &str,
        params: &[(String, String)],
    ) -> Result<T, MoodleError> {
        let mut backoff_ms = self.retry_backoff_ms;
        let mut attempt = 0;
        let value = loop {
            match self.send_once(wsfunction, params).await {
                Ok(value) => break value,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait = match &e {
                        MoodleError::RateLimited { retry_after_ms } => {
                            backoff_ms.max(*retry_after_ms).min(MAX_BACKOFF_MS)
                        }
                        _ => backoff_ms,
                    };
                    tracing::warn!(attempt, wait_ms = wait, error = %e, "retrying web-service call");
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e),
            }
        };

        serde_json::from_value(value).map_err(|e| MoodleError::ApiError {
            status: 200,
            message: format!("unexpected {wsfunction} response: {e}"),
        })
    }

    async fn send_once(
        &self,
        wsfunction: &str,
        params: &[(String, String)],
    ) -> Result<Value, MoodleError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("wstoken", self.token.as_str()),
            ("wsfunction", wsfunction),
            ("moodlewsrestformat", "json"),
        ];
        form.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MoodleError::Timeout(self.timeout_secs)
                } else {
                    MoodleError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
                * 1000;
            return Err(MoodleError::RateLimited {
                retry_after_ms: retry_after,
            });
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(MoodleError::AuthenticationFailed(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(MoodleError::ApiError {
                status,
                message: body,
            });
        }

        let data: Value = response.json().await.map_err(|e| MoodleError::ApiError {
            status,
            message: format!("failed to parse response: {e}"),
        })?;

        if let Some(obj) = data.as_object() {
            if obj.get("exception").is_some_and(|e| !e.is_null()) {
                let field = |key: &str, fallback: &str| {
                    obj.get(key)
                        .and_then(Value::as_str)
                        .unwrap_or(fallback)
                        .to_string()
                };
                return Err(MoodleError::WebService {
                    errorcode: field("errorcode", "unknown"),
                    message: field("message", "Unknown WS error"),
                });
            }
        }

        Ok(data)
    }

    /// `core_webservice_get_site_info`, used to check the token.
    pub async fn site_info(&self) -> Result<SiteInfo, MoodleError> {
        self.call("core_webservice_get_site_info", &[]).await
    }
}

/// Identity of the token owner and the site.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteInfo {
    #[serde(default)]
    pub sitename: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub functions: Vec<SiteFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteFunction {
    pub name: String,
}

impl SiteInfo {
    /// Whether the token may call `wsfunction`.
    pub fn allows(&self, wsfunction: &str) -> bool {
        self.functions.iter().any(|f| f.name == wsfunction)
    }
}

/// Functions the export needs the token to be allowed to call.
pub const REQUIRED_FUNCTIONS: [&str; 4] = [
    "mod_quiz_get_quizzes_by_courses",
    "core_enrol_get_enrolled_users",
    "mod_quiz_get_user_attempts",
    "mod_quiz_get_attempt_review",
];

#[derive(Deserialize)]
struct QuizzesResponse {
    #[serde(default)]
    quizzes: Vec<WireQuiz>,
}

#[derive(Deserialize)]
struct WireQuiz {
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct WireUser {
    id: i64,
    #[serde(default)]
    firstname: String,
    #[serde(default)]
    lastname: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    idnumber: Option<String>,
    #[serde(default)]
    roles: Vec<WireRole>,
    #[serde(default)]
    customfields: Vec<WireCustomField>,
}

#[derive(Deserialize)]
struct WireRole {
    #[serde(default)]
    shortname: String,
}

#[derive(Deserialize)]
struct WireCustomField {
    #[serde(default)]
    shortname: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AttemptsResponse {
    Wrapped {
        #[serde(default)]
        attempts: Vec<WireAttempt>,
    },
    Bare(Vec<WireAttempt>),
}

#[derive(Deserialize)]
struct WireAttempt {
    id: i64,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    timestart: Option<i64>,
    #[serde(default)]
    timefinish: Option<i64>,
}

#[derive(Deserialize)]
struct WireReview {
    #[serde(default)]
    grade: Option<Mark>,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Deserialize)]
struct WireQuestion {
    #[serde(default)]
    slot: Option<Mark>,
    #[serde(default)]
    mark: Option<Mark>,
    #[serde(default)]
    fraction: Option<Mark>,
    #[serde(default)]
    maxmark: Option<Mark>,
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<WireUser> for Student {
    fn from(u: WireUser) -> Self {
        let custom: HashMap<String, String> = u
            .customfields
            .iter()
            .filter(|cf| !cf.shortname.is_empty())
            .map(|cf| (cf.shortname.to_uppercase(), value_to_text(&cf.value)))
            .collect();
        Student {
            id: u.id,
            firstname: u.firstname,
            lastname: u.lastname,
            email: u.email,
            idnumber: u.idnumber.unwrap_or_default(),
            custom,
        }
    }
}

impl From<WireAttempt> for Attempt {
    fn from(a: WireAttempt) -> Self {
        Attempt {
            id: a.id,
            state: a.state.unwrap_or_default(),
            time_start: a.timestart.unwrap_or(0),
            time_finish: a.timefinish.unwrap_or(0),
        }
    }
}

impl From<WireReview> for AttemptReview {
    fn from(r: WireReview) -> Self {
        let number = |m: Option<Mark>| m.and_then(|m| m.as_f64());
        AttemptReview {
            grade: number(r.grade),
            questions: r
                .questions
                .into_iter()
                .map(|q| ReviewedQuestion {
                    slot: number(q.slot).map(|s| s as i64),
                    mark: q.mark,
                    fraction: number(q.fraction),
                    maxmark: number(q.maxmark),
                })
                .collect(),
        }
    }
}

fn param(key: &str, value: i64) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl GradingSource for MoodleClient {
    fn name(&self) -> &str {
        "moodle"
    }

    async fn discover_quizzes(&self, course_ids: &[i64]) -> anyhow::Result<Vec<Quiz>> {
        let mut quizzes = Vec::new();
        for &course_id in course_ids {
            let response: QuizzesResponse = self
                .call(
                    "mod_quiz_get_quizzes_by_courses",
                    &[param("courseids[0]", course_id)],
                )
                .await?;
            tracing::debug!(course_id, count = response.quizzes.len(), "quizzes found");
            quizzes.extend(response.quizzes.into_iter().map(|q| Quiz {
                course_id,
                quiz_id: q.id,
                name: q.name,
            }));
        }
        Ok(quizzes)
    }

    async fn course_users(
        &self,
        course_id: i64,
        only_roles: &[String],
    ) -> anyhow::Result<Vec<Student>> {
        let users: Vec<WireUser> = self
            .call(
                "core_enrol_get_enrolled_users",
                &[param("courseid", course_id)],
            )
            .await?;
        Ok(users
            .into_iter()
            .filter(|u| {
                let roles: Vec<String> = u.roles.iter().map(|r| r.shortname.clone()).collect();
                role_matches(&roles, only_roles)
            })
            .map(Student::from)
            .collect())
    }

    async fn user_attempts(&self, quiz_id: i64, user_id: i64) -> anyhow::Result<Vec<Attempt>> {
        let response: AttemptsResponse = self
            .call(
                "mod_quiz_get_user_attempts",
                &[param("quizid", quiz_id), param("userid", user_id)],
            )
            .await?;
        let attempts = match response {
            AttemptsResponse::Wrapped { attempts } | AttemptsResponse::Bare(attempts) => attempts,
        };
        Ok(attempts.into_iter().map(Attempt::from).collect())
    }

    async fn attempt_review(&self, attempt_id: i64) -> anyhow::Result<AttemptReview> {
        let review: WireReview = self
            .call(
                "mod_quiz_get_attempt_review",
                &[param("attemptid", attempt_id)],
            )
            .await?;
        Ok(review.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(uri: &str) -> MoodleSettings {
        MoodleSettings {
            base_url: format!("{uri}/"),
            token: "test-token".into(),
            timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    fn ws_mock(wsfunction: &str) -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path("/webservice/rest/server.php"))
            .and(body_string_contains(format!("wsfunction={wsfunction}")))
    }

    #[tokio::test]
    async fn discovers_quizzes_per_course() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_quizzes_by_courses")
            .and(body_string_contains("wstoken=test-token"))
            .and(body_string_contains("moodlewsrestformat=json"))
            .and(body_string_contains("courseids%5B0%5D=100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quizzes": [
                    {"id": 11907, "course": 100, "name": "Examen Ingenierías"},
                    {"id": 11908, "course": 100, "name": "Examen Salud"}
                ],
                "warnings": []
            })))
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let quizzes = client.discover_quizzes(&[100]).await.unwrap();
        assert_eq!(quizzes.len(), 2);
        assert_eq!(quizzes[0].course_id, 100);
        assert_eq!(quizzes[0].quiz_id, 11907);
        assert_eq!(quizzes[1].name, "Examen Salud");
    }

    #[tokio::test]
    async fn course_users_filters_roles_and_maps_custom_fields() {
        let server = MockServer::start().await;

        ws_mock("core_enrol_get_enrolled_users")
            .and(body_string_contains("courseid=100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {
                    "id": 5,
                    "firstname": "Ana",
                    "lastname": "Quispe Rojas",
                    "email": "ana@example.com",
                    "roles": [{"roleid": 5, "shortname": "Student"}],
                    "customfields": [
                        {"shortname": "dni_ce", "value": "12345678"},
                        {"shortname": "PROGRAMA_ACADEMICO", "value": "Enfermería"},
                        {"shortname": "SEDE_FILIAL", "value": "Filial Ica"},
                        {"shortname": "CODIGO_DE_MATRICULA", "value": 2025001},
                        {"shortname": "", "value": "ignored"}
                    ]
                },
                {
                    "id": 6,
                    "firstname": "Luis",
                    "lastname": "Docente",
                    "email": "luis@example.com",
                    "roles": [{"roleid": 3, "shortname": "editingteacher"}]
                }
            ])))
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let users = client
            .course_users(100, &["student".to_string()])
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        let ana = &users[0];
        assert_eq!(ana.dni(), "12345678");
        assert_eq!(ana.programa(), "Enfermería");
        assert_eq!(ana.sede(), "Filial Ica");
        assert_eq!(ana.codigo_matricula(), "2025001");
        assert_eq!(ana.idnumber, "");

        let everyone = client.course_users(100, &[]).await.unwrap();
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn attempts_accept_wrapped_and_bare_lists() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_user_attempts")
            .and(body_string_contains("userid=5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "attempts": [
                    {"id": 900, "state": "finished", "timestart": 1741528800, "timefinish": 1741536000}
                ],
                "warnings": []
            })))
            .mount(&server)
            .await;
        ws_mock("mod_quiz_get_user_attempts")
            .and(body_string_contains("userid=6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 901, "state": "inprogress", "timestart": 1741528800, "timefinish": null}
            ])))
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let wrapped = client.user_attempts(11907, 5).await.unwrap();
        assert_eq!(wrapped.len(), 1);
        assert_eq!(wrapped[0].time_finish, 1741536000);

        let bare = client.user_attempts(11907, 6).await.unwrap();
        assert_eq!(bare[0].id, 901);
        assert_eq!(bare[0].time_finish, 0);
        assert_eq!(bare[0].state, "inprogress");
    }

    #[tokio::test]
    async fn review_decodes_text_marks() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_attempt_review")
            .and(body_string_contains("attemptid=900"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "grade": "14.60",
                "attempt": {"id": 900},
                "questions": [
                    {"slot": 1, "mark": "0.20", "maxmark": 0.2},
                    {"slot": 2, "mark": "0,00", "maxmark": 0.2},
                    {"slot": 3, "fraction": 1.0, "maxmark": 0.2},
                    {"slot": "4", "mark": null}
                ]
            })))
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let review = client.attempt_review(900).await.unwrap();
        assert_eq!(review.grade, Some(14.6));
        assert_eq!(review.questions.len(), 4);
        assert_eq!(review.questions[0].mark.as_ref().and_then(Mark::as_f64), Some(0.2));
        assert_eq!(review.questions[1].mark.as_ref().and_then(Mark::as_f64), Some(0.0));
        assert_eq!(review.questions[2].fraction, Some(1.0));
        assert_eq!(review.questions[3].slot, Some(4));
        assert!(review.questions[3].mark.is_none());
    }

    #[tokio::test]
    async fn exception_payload_is_not_retried() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_attempt_review")
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exception": "moodle_exception",
                "errorcode": "invalidtoken",
                "message": "Invalid token - token not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let err = client.attempt_review(1).await.unwrap_err();
        match err.downcast_ref::<MoodleError>() {
            Some(MoodleError::WebService { errorcode, .. }) => {
                assert_eq!(errorcode, "invalidtoken")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_transient_server_errors() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_quizzes_by_courses")
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        ws_mock("mod_quiz_get_quizzes_by_courses")
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "quizzes": [{"id": 1, "name": "Examen"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let quizzes = client.discover_quizzes(&[7]).await.unwrap();
        assert_eq!(quizzes.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;

        ws_mock("mod_quiz_get_user_attempts")
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .expect(3)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let err = client.user_attempts(1, 2).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after() {
        let server = MockServer::start().await;

        ws_mock("core_webservice_get_site_info")
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        ws_mock("core_webservice_get_site_info")
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sitename": "Aula Virtual",
                "functions": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let info = client.site_info().await.unwrap();
        assert_eq!(info.sitename, "Aula Virtual");
    }

    #[tokio::test]
    async fn rate_limit_gives_up_after_max_retries() {
        let server = MockServer::start().await;

        ws_mock("core_webservice_get_site_info")
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let err = client.site_info().await.unwrap_err();
        assert!(matches!(err, MoodleError::RateLimited { retry_after_ms: 0 }));
    }

    #[tokio::test]
    async fn connection_refused_is_a_network_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = MoodleClient::new(&settings(&format!("http://{addr}"))).unwrap();
        let started = std::time::Instant::now();
        let err = client.site_info().await.unwrap_err();
        assert!(matches!(err, MoodleError::NetworkError(_)), "got {err:?}");
        // two retries with 1 ms then 2 ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(3));
    }

    #[tokio::test]
    async fn unauthorized_fails_immediately() {
        let server = MockServer::start().await;

        ws_mock("core_webservice_get_site_info")
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let err = client.site_info().await.unwrap_err();
        assert!(matches!(err, MoodleError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn site_info_lists_functions() {
        let server = MockServer::start().await;

        ws_mock("core_webservice_get_site_info")
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sitename": "Aula Virtual",
                "username": "ws_admision",
                "release": "4.1.2",
                "functions": [
                    {"name": "mod_quiz_get_quizzes_by_courses", "version": "2022112800"},
                    {"name": "mod_quiz_get_attempt_review", "version": "2022112800"}
                ]
            })))
            .mount(&server)
            .await;

        let client = MoodleClient::new(&settings(&server.uri())).unwrap();
        let info = client.site_info().await.unwrap();
        assert_eq!(info.sitename, "Aula Virtual");
        assert!(info.allows("mod_quiz_get_attempt_review"));
        assert!(!info.allows("core_enrol_get_enrolled_users"));
    }
}
