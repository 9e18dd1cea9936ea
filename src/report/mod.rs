//! Connection Report
//!
//! Human-readable summary of one HMRC call, shown to the user by the host.
//!
//! Layout, one field per line:
//!
//! ```text
//! Date 2026-04-06     Time 09:30:00
//! Sorry. The connection failed !
//! Please check the log below for details.
//!
//! Connection Status Details:
//! Request Sent:
//! https://test-api.service.hmrc.gov.uk/hello/user
//!
//! Error Code:
//! 401
//!
//! Response Received:
//! INVALID_CREDENTIALS
//! Invalid Authentication information provided
//! ```
//!
//! Reports never contain credentials: the request line is the endpoint URL
//! and the response part is whatever message HMRC returned.

use chrono::{DateTime, Utc};
use std::fmt;

const SUCCESS_LINE: &str = "Congratulations ! The connection succeeded.";
const FAILURE_LINE: &str = "Sorry. The connection failed !";
const DETAILS_HINT: &str = "Please check the log below for details.";
const NO_RESPONSE: &str = "No response";

/// Whether the reported call succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Success,
    Failure,
}

/// Structured form of a report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionReport {
    pub kind: ReportKind,
    pub timestamp: DateTime<Utc>,
    pub request_url: String,
    /// HTTP status, `None` when no response arrived.
    pub status: Option<u16>,
    pub server_code: Option<String>,
    pub server_message: String,
}

impl ConnectionReport {
    pub fn success(
        request_url: impl Into<String>,
        server_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ReportKind::Success,
            timestamp: now,
            request_url: request_url.into(),
            status: None,
            server_code: None,
            server_message: server_message.into(),
        }
    }

    pub fn failure(
        request_url: impl Into<String>,
        status: Option<u16>,
        server_message: impl Into<String>,
        server_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: ReportKind::Failure,
            timestamp: now,
            request_url: request_url.into(),
            status,
            server_code: server_code.map(str::to_string),
            server_message: server_message.into(),
        }
    }
}

impl fmt::Display for ConnectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Date {}     Time {}",
            self.timestamp.format("%Y-%m-%d"),
            self.timestamp.format("%H:%M:%S")
        )?;
        match self.kind {
            ReportKind::Success => writeln!(f, "{}", SUCCESS_LINE)?,
            ReportKind::Failure => writeln!(f, "{}", FAILURE_LINE)?,
        }
        writeln!(f, "{}", DETAILS_HINT)?;
        writeln!(f)?;
        writeln!(f, "Connection Status Details:")?;
        writeln!(f, "Request Sent:")?;
        writeln!(f, "{}", self.request_url)?;
        writeln!(f)?;

        if self.kind == ReportKind::Failure {
            writeln!(f, "Error Code:")?;
            match self.status {
                Some(status) => writeln!(f, "{}", status)?,
                None => writeln!(f, "{}", NO_RESPONSE)?,
            }
            writeln!(f)?;
        }

        writeln!(f, "Response Received:")?;
        if let Some(code) = &self.server_code {
            writeln!(f, "{}", code)?;
        }
        write!(f, "{}", self.server_message)
    }
}

/// Report for a successful call.
pub fn format_success(request_url: &str, server_message: &str, now: DateTime<Utc>) -> String {
    ConnectionReport::success(request_url, server_message, now).to_string()
}

/// Report for a failed call. `status` is `None` for transport failures.
pub fn format_error(
    request_url: &str,
    status: Option<u16>,
    server_message: &str,
    server_code: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    ConnectionReport::failure(request_url, status, server_message, server_code, now).to_string()
}
