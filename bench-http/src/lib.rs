pub mod duration_str;

use anyhow::Error as AnyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_DURATION_SECS: i64 = 10;

/// Describe a benchmark run
///
/// ```json
/// {"time": 5, "urls": ["http://127.0.0.1:2080/a"], "token": "run-1", "worker_num": 4}
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RunRequest {
    /// run duration in seconds, 0 means [`DEFAULT_DURATION_SECS`]
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub urls: Vec<String>,
    /// identifies the run, a random one gets assigned when empty
    #[serde(default)]
    pub token: String,
    /// 0 means use the configured default
    #[serde(default)]
    pub worker_num: i64,
}

impl RunRequest {
    pub fn new(token: &str, urls: Vec<String>, time: i64, worker_num: i64) -> Self {
        RunRequest {
            time,
            urls,
            token: token.to_string(),
            worker_num,
        }
    }
}

/// Final statistics of a run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunSummary {
    #[serde(rename = "success_counter")]
    pub success_count: u64,
    #[serde(rename = "request_count_per_sec")]
    pub requests_per_sec: f64,
    #[serde(rename = "fail_counter")]
    pub fail_count: u64,
    #[serde(rename = "resp_time_avg", with = "duration_str")]
    pub average_latency: Duration,
    /// elapsed wall clock time of the whole run
    #[serde(rename = "total_resp_time", with = "duration_str")]
    pub total_elapsed: Duration,
    #[serde(rename = "max_resp_time", with = "duration_str")]
    pub max_latency: Duration,
    #[serde(rename = "min_resp_time", with = "duration_str")]
    pub min_latency: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenericResponse<T: Serialize> {
    #[serde(flatten)]
    pub data: HashMap<String, T>,
}

impl<T: Serialize> Default for GenericResponse<T> {
    fn default() -> Self {
        GenericResponse {
            data: HashMap::with_capacity(2),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenericError {
    pub error_code: u16,
    pub message: String,
    #[serde(flatten)]
    pub data: HashMap<String, String>,
}

impl GenericError {
    pub fn internal_500(msg: &str) -> GenericError {
        GenericError {
            error_code: 500,
            message: msg.to_string(),
            ..Default::default()
        }
    }

    pub fn new(msg: &str, code: u16) -> Self {
        Self {
            error_code: code,
            message: msg.to_string(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, key: &str, value: String) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

macro_rules! from_error {
    ($t:ty) => {
        impl From<$t> for GenericError {
            fn from(e: $t) -> Self {
                GenericError {
                    error_code: 500,
                    message: e.to_string(),
                    ..Default::default()
                }
            }
        }
    };
}

from_error!(AnyError);
from_error!(serde_json::Error);

impl Default for GenericError {
    fn default() -> Self {
        GenericError {
            error_code: u16::MAX,
            message: String::new(),
            data: HashMap::new(),
        }
    }
}

impl Display for GenericError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.error_code,
            self.message,
            self.data.len()
        )
    }
}

impl StdError for GenericError {}

#[cfg(test)]
mod test {
    use crate::*;

    #[test]
    fn deserialize_run_request() {
        let req = r#"
            {
              "time": 3,
              "urls": ["http://127.0.0.1:2080/a", "http://127.0.0.1:2080/b"],
              "token": "demo-run",
              "worker_num": 4
            }
        "#;
        let result = serde_json::from_str::<RunRequest>(req).unwrap();
        assert_eq!(result.time, 3);
        assert_eq!(result.urls.len(), 2);
        assert_eq!(result.token, "demo-run");
        assert_eq!(result.worker_num, 4);
    }

    #[test]
    fn deserialize_run_request_with_missing_fields() {
        let result = serde_json::from_str::<RunRequest>(r#"{"urls":["http://a"]}"#).unwrap();
        assert_eq!(result.time, 0);
        assert_eq!(result.worker_num, 0);
        assert!(result.token.is_empty());

        let result = serde_json::from_str::<RunRequest>("{}").unwrap();
        assert!(result.urls.is_empty());
    }

    #[test]
    fn serialize_run_summary() {
        let summary = RunSummary {
            success_count: 10,
            requests_per_sec: 5.0,
            fail_count: 2,
            average_latency: Duration::from_millis(250),
            total_elapsed: Duration::from_millis(3_001),
            max_latency: Duration::from_millis(40),
            min_latency: Duration::ZERO,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["success_counter"], 10);
        assert_eq!(value["request_count_per_sec"], 5.0);
        assert_eq!(value["fail_counter"], 2);
        assert_eq!(value["resp_time_avg"], "250ms");
        assert_eq!(value["total_resp_time"], "3s 1ms");
        assert_eq!(value["max_resp_time"], "40ms");
        assert_eq!(value["min_resp_time"], "0s");

        let back: RunSummary = serde_json::from_value(value).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn generic_error_flattens_data() {
        let err = GenericError::new("no url", 400).with_data("code", "EmptyUrlList".into());
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error_code"], 400);
        assert_eq!(value["message"], "no url");
        assert_eq!(value["code"], "EmptyUrlList");
        assert_eq!("(400, no url, 1)", err.to_string());
    }
}
