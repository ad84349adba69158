use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_DELIVERY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailResult {
    pub success: bool,
    pub message: String,
}

/// Stand-in for a real mail provider. Nothing leaves the process: messages
/// are logged after a fixed delay.
#[derive(Debug, Clone)]
pub struct EmailService {
    base_url: String,
    delay: Duration,
    simulate_failure: bool,
}

impl EmailService {
    pub fn new(base_url: &str, delay: Duration) -> Self {
        EmailService {
            base_url: base_url.to_string(),
            delay,
            simulate_failure: false,
        }
    }

    pub fn with_simulated_failure(mut self, simulate_failure: bool) -> Self {
        self.simulate_failure = simulate_failure;
        self
    }

    pub fn reset_link(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::InvalidInput(format!("{} cannot be used as a base url", &self.base_url))
            })?
            .pop_if_empty()
            .push("reset-password");
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;

        if self.simulate_failure {
            return Err(Error::InvalidInput(format!(
                "simulated delivery failure for {}",
                to
            )));
        }

        tracing::info!("Email sent to={} subject={}\n{}", to, subject, body);
        Ok(())
    }

    pub async fn send_password_reset_email(&self, email: &str, token: &str) -> EmailResult {
        let outcome = async {
            let link = self.reset_link(token)?;
            let body = format!(
                "You requested a password reset.\n\
                 Use the link below within one hour to choose a new password:\n\
                 {}\n\
                 If you did not request this, you can ignore this email.",
                link
            );
            self.deliver(email, "Reset your password", &body).await
        }
        .await;

        match outcome {
            Ok(()) => EmailResult {
                success: true,
                message: String::from("Password reset email sent"),
            },
            Err(err) => {
                tracing::error!("Failed to send password reset email to {}: {}", email, err);
                EmailResult {
                    success: false,
                    message: format!("Failed to send password reset email: {}", err),
                }
            }
        }
    }

    pub async fn send_password_changed_email(&self, email: &str) -> EmailResult {
        let body = "Your password was changed. If this was not you, reset it immediately.";

        match self.deliver(email, "Your password was changed", body).await {
            Ok(()) => EmailResult {
                success: true,
                message: String::from("Password change confirmation sent"),
            },
            Err(err) => {
                tracing::error!("Failed to send confirmation email to {}: {}", email, err);
                EmailResult {
                    success: false,
                    message: format!("Failed to send password change confirmation: {}", err),
                }
            }
        }
    }
}
