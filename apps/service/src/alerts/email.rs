use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::Alerter;
use crate::config::Options;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Hands alerts to the local mail facility (`mail -s <subject> <recipient>`).
///
/// The `recipient` and `mail_command` target options override the defaults.
pub struct EmailAlerter {
    recipient: String,
    mail_command: String,
}

impl EmailAlerter {
    pub fn new(recipient: impl Into<String>, mail_command: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), mail_command: mail_command.into() }
    }
}

pub fn subject(target: &str, host: &str) -> String {
    format!("ALERT: {target} ({host})")
}

pub fn body(target: &str, host: &str, message: &str) -> String {
    format!("{message}\n\nSystem: {target}\nHost: {host}\n")
}

#[async_trait::async_trait]
impl Alerter for EmailAlerter {
    async fn send_alert(&self, target: &str, host: &str, message: &str, options: &Options) -> Result<()> {
        let recipient = options.get("recipient").unwrap_or(&self.recipient);
        let mail_command = options.get("mail_command").unwrap_or(&self.mail_command);

        let mut child = Command::new(mail_command)
            .arg("-s")
            .arg(subject(target, host))
            .arg(recipient)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run `{mail_command}`"))?;

        let mut stdin = child.stdin.take().ok_or_else(|| anyhow!("mail command has no stdin"))?;
        let email = body(target, host, message);

        let delivery = async move {
            stdin.write_all(email.as_bytes()).await?;
            drop(stdin);
            child.wait().await
        };

        let status = timeout(SEND_TIMEOUT, delivery)
            .await
            .map_err(|_| anyhow!("`{mail_command}` did not finish within {}s", SEND_TIMEOUT.as_secs()))?
            .with_context(|| format!("failed to pipe alert to `{mail_command}`"))?;

        if !status.success() {
            bail!("`{mail_command}` exited with {status}");
        }

        debug!(target_name = target, recipient = %recipient, "Alert email handed to mail command");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_and_body() {
        assert_eq!(subject("db", "10.0.0.5"), "ALERT: db (10.0.0.5)");

        let body = body("db", "10.0.0.5", "System db is DOWN. Check type: ping");
        assert!(body.starts_with("System db is DOWN. Check type: ping\n\n"));
        assert!(body.contains("System: db\n"));
        assert!(body.contains("Host: 10.0.0.5\n"));
    }

    #[tokio::test]
    async fn test_missing_mail_command_is_an_error() {
        let alerter = EmailAlerter::new("root", "/nonexistent/watcher-mail");
        let result = alerter.send_alert("db", "10.0.0.5", "down", &Options::new()).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_option_overrides_mail_command() {
        let alerter = EmailAlerter::new("root", "/nonexistent/watcher-mail");

        let mut options = Options::new();
        options.insert("mail_command".into(), "/bin/false".into());
        let err = alerter.send_alert("db", "10.0.0.5", "down", &options).await.unwrap_err();
        assert!(err.to_string().contains("/bin/false"));
    }
}
