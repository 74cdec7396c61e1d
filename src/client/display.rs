//! Periodic printing of selected configuration keys.

use crate::client::Configuration;
use crate::error::Result;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Write `key = value` lines for `keys` to `writer` every `interval` until
/// `token` is cancelled.
///
/// Missing keys are shown as `<unset>`. The first round is written immediately.
/// Cancellation is checked while waiting, so the loop returns promptly.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_remote::client::{Configuration, display_periodically};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(config: Configuration) -> hotswap_remote::error::Result<()> {
/// let token = CancellationToken::new();
/// let keys = vec!["Config.Text".to_string()];
/// display_periodically(&config, &keys, Duration::from_secs(5), token, tokio::io::stdout()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn display_periodically<W>(
    config: &Configuration,
    keys: &[String],
    interval: Duration,
    token: CancellationToken,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let mut block = String::new();
        for key in keys {
            let value = config
                .get_string(key)
                .unwrap_or_else(|| "<unset>".to_string());
            block.push_str(&format!("{} = {}\n", key, value));
        }
        writer.write_all(block.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteConfigurationProvider;

    #[tokio::test]
    async fn test_stops_when_cancelled() {
        let provider = RemoteConfigurationProvider::builder()
            .with_service_uri("http://localhost:5000")
            .with_configuration_name("a.json")
            .build()
            .unwrap();
        let config = Configuration::new(vec![provider], None);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let mut output = Vec::new();
        let keys = vec!["Config.Text".to_string()];
        tokio::time::timeout(
            Duration::from_secs(5),
            display_periodically(&config, &keys, Duration::from_secs(3600), token, &mut output),
        )
        .await
        .expect("display loop did not stop")
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "Config.Text = <unset>\n");
    }
}
