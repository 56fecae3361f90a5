use std::future::Future;

use anyhow::{anyhow, bail, Context, Result};
use jiff::civil::DateTime;
use reqwest::{header::AUTHORIZATION, Client};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::{
    auth::SiteCredentials,
    data::{Attendance, AttendanceValue, MonitoredModule},
    params::ReportBy,
};

/// Anything that can report attendance for a monitored module.
pub trait AttendanceSource {
    fn fetch(
        &self,
        module: &MonitoredModule,
    ) -> impl Future<Output = Result<Vec<Attendance>>> + Send;
}

/// `GET` client for the TDS attendance report.
#[derive(Clone)]
pub struct TdsClient {
    http: Client,
    base_url: String,
    authorization: String,
}

impl TdsClient {
    pub fn new(credentials: &SiteCredentials) -> Result<Self> {
        Ok(Self::with_client(Client::builder().build()?, credentials))
    }

    pub fn with_client(http: Client, credentials: &SiteCredentials) -> Self {
        Self {
            http,
            base_url: credentials.base_url.clone(),
            authorization: credentials.authorization(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl AttendanceSource for TdsClient {
    async fn fetch(&self, module: &MonitoredModule) -> Result<Vec<Attendance>> {
        let url = request_url(&self.base_url, module);
        debug!(%url, "requesting attendance");

        let text = self
            .http
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .with_context(|| format!("request for module {} failed", module.id))?
            .error_for_status()
            .with_context(|| format!("TDS rejected request for module {}", module.id))?
            .text()
            .await?;

        let report = parse_report(&text)
            .with_context(|| format!("malformed TDS response for module {}", module.id))?;
        Ok(report.items.into_iter().map(Attendance::from).collect())
    }
}

/// Closed-open window sent to TDS: midnight on the first day to the last second of the last.
pub fn request_window(module: &MonitoredModule) -> (DateTime, DateTime) {
    (
        module.from_date.at(0, 0, 0, 0),
        module.to_date.at(23, 59, 59, 0),
    )
}

/// `base_url` is used as-is and is expected to end where the query starts (`...?`).
pub fn request_url(base_url: &str, module: &MonitoredModule) -> String {
    let (from, to) = request_window(module);
    let search_by: String = url::form_urlencoded::byte_serialize(module.id.as_bytes()).collect();
    format!(
        "{}fromDate={}&toDate={}&reportBy={}&searchBy={}&historyData=true",
        base_url,
        from,
        to,
        ReportBy::Module,
        search_by
    )
}

#[derive(Deserialize, Debug)]
struct AttendanceReport {
    items: Vec<AttendanceItem>,
}

#[derive(Deserialize, Debug)]
struct AttendanceItem {
    #[serde(deserialize_with = "string_or_integer")]
    student_id: String,
    #[serde(deserialize_with = "attendance_scalar")]
    attendance: AttendanceValue,
    attended: i64,
    approved_absence: i64,
    total_events: i64,
    late_count: i64,
}

impl From<AttendanceItem> for Attendance {
    fn from(item: AttendanceItem) -> Self {
        Attendance {
            student_id: item.student_id,
            attendance: item.attendance,
            attended: item.attended,
            approved_absence: item.approved_absence,
            total_events: item.total_events,
            late_count: item.late_count,
        }
    }
}

fn parse_report(text: &str) -> Result<AttendanceReport> {
    match serde_json::from_str::<AttendanceReport>(text) {
        Result::Ok(report) => Ok(report),
        Result::Err(e) => {
            let line = text
                .lines()
                .nth(e.line().saturating_sub(1))
                .with_context(|| anyhow!("can't find line for error: {}", e))?;
            bail!("line: {}\nerr: {}", line, e);
        }
    }
}

// `1001.0` would become `LON1001.0` and never match a course membership
fn string_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or integer student id, got {other}"
        ))),
    }
}

fn attendance_scalar<'de, D>(deserializer: D) -> Result<AttendanceValue, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(AttendanceValue::Percent)
            .ok_or_else(|| serde::de::Error::custom("attendance out of range")),
        serde_json::Value::String(s) => match s.parse::<AttendanceValue>() {
            Ok(value) => Ok(value),
            Err(never) => match never {},
        },
        serde_json::Value::Bool(b) => Ok(AttendanceValue::Flag(b.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected attendance percentage or flag, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    use super::*;

    fn module() -> MonitoredModule {
        MonitoredModule {
            id: "CS101-2324S1".to_string(),
            from_date: date(2023, 10, 2),
            to_date: date(2023, 10, 8),
        }
    }

    fn credentials(base_url: String) -> SiteCredentials {
        SiteCredentials {
            base_url,
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    // local listener, so keep any configured proxy out of the way
    fn client(base_url: String) -> TdsClient {
        let http = Client::builder().no_proxy().build().unwrap();
        TdsClient::with_client(http, &credentials(base_url))
    }

    /// Accepts one connection, answers it with `status` and `body`, and
    /// returns the raw request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                request.extend_from_slice(&chunk[..n]);
                if n == 0 || request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8(request).unwrap()
        });
        (format!("http://{addr}/attendance?"), handle)
    }

    #[test]
    fn url_covers_whole_days() {
        let url = request_url("https://tds.example/api/report?", &module());
        assert_eq!(
            url,
            "https://tds.example/api/report?fromDate=2023-10-02T00:00:00&toDate=2023-10-08T23:59:59\
             &reportBy=module&searchBy=CS101-2324S1&historyData=true"
        );
    }

    #[test]
    fn url_escapes_module_id() {
        let mut m = module();
        m.id = "CS 101&x".to_string();
        assert!(request_url("b?", &m).contains("searchBy=CS+101%26x&"));
    }

    #[test]
    fn items_accept_loose_types() {
        let report = parse_report(
            r#"{"items": [
                {"student_id": 1001, "attendance": "87.5", "attended": 7, "approved_absence": 1, "total_events": 8, "late_count": 2},
                {"student_id": "1002", "attendance": 100, "attended": 8, "approved_absence": 0, "total_events": 8, "late_count": 0}
            ]}"#,
        )
        .unwrap();
        let items: Vec<Attendance> = report.items.into_iter().map(Attendance::from).collect();
        assert_eq!(items[0].student_id, "1001");
        assert_eq!(items[0].attendance, AttendanceValue::Percent(87.5));
        assert_eq!(items[0].late_count, 2);
        assert_eq!(items[1].student_id, "1002");
        assert_eq!(items[1].attendance, AttendanceValue::Percent(100.0));
    }

    #[test]
    fn flag_attendance_is_accepted() {
        let report = parse_report(
            r#"{"items": [
                {"student_id": "1001", "attendance": "Y", "attended": 0, "approved_absence": 0, "total_events": 0, "late_count": 0},
                {"student_id": "1002", "attendance": false, "attended": 0, "approved_absence": 0, "total_events": 0, "late_count": 0}
            ]}"#,
        )
        .unwrap();
        assert_eq!(report.items[0].attendance, AttendanceValue::Flag("Y".to_string()));
        assert_eq!(report.items[1].attendance, AttendanceValue::Flag("false".to_string()));
    }

    #[test]
    fn fractional_student_id_is_rejected() {
        let err = parse_report(
            r#"{"items": [{"student_id": 1001.0, "attendance": 50, "attended": 1, "approved_absence": 0, "total_events": 2, "late_count": 0}]}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("student id"));
    }

    #[test]
    fn missing_items_is_an_error() {
        assert!(parse_report(r#"{"data": []}"#).is_err());
        assert!(parse_report("<html>").is_err());
    }

    #[tokio::test]
    async fn fetch_sends_window_and_auth() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"items": [{"student_id": "1001", "attendance": 50, "attended": 4, "approved_absence": 0, "total_events": 8, "late_count": 1}]}"#,
        )
        .await;
        let client = client(base_url);

        let items = client.fetch(&module()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].user_id(), "LON1001");

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /attendance?fromDate=2023-10-02T00:00:00&toDate=2023-10-08T23:59:59\
             &reportBy=module&searchBy=CS101-2324S1&historyData=true HTTP/1.1"
        );
        let auth = request
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("authorization:"))
            .unwrap();
        assert_eq!(auth.split_once(':').unwrap().1.trim(), "Basic dT==");
    }

    #[tokio::test]
    async fn fetch_fails_on_error_status() {
        let (base_url, server) = serve_once("500 Internal Server Error", "{}").await;
        let client = client(base_url);

        let err = client.fetch(&module()).await.unwrap_err();
        assert!(format!("{err:#}").contains("CS101-2324S1"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_fails_on_malformed_body() {
        let (base_url, server) = serve_once("200 OK", r#"{"items": [{"student_id": 1}]}"#).await;
        let client = client(base_url);

        let err = client.fetch(&module()).await.unwrap_err();
        assert!(format!("{err:#}").contains("malformed TDS response"));
        server.await.unwrap();
    }
}
