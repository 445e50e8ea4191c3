use async_trait::async_trait;

use crate::error::Result;
use crate::tool::Tool;

pub const VERSION: &str = "1.0.0";

/// Report the current UTC time.
pub struct Clock;

#[async_trait]
impl Tool for Clock {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Report the current date and time (UTC)"
    }

    fn usage(&self) -> &str {
        "clock: {}"
    }

    fn triggers(&self) -> Vec<String> {
        vec![
            "what time".to_string(),
            "current time".to_string(),
            "what.s the date".to_string(),
            "几点".to_string(),
        ]
    }

    async fn run(&self, _args: serde_json::Value) -> Result<String> {
        Ok(chrono::Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_a_parseable_timestamp() {
        let out = Clock.run(serde_json::json!({})).await.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&out).is_ok());
    }
}
