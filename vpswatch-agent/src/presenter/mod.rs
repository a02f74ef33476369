//! Status rendering and the single edit-in-place status message

use crate::chat::{ChannelHandle, ChatChannel, Embed, MessageHandle, COLOR_BLUE, COLOR_RED};
use crate::error::ChannelError;
use crate::logins::LoginEvent;
use crate::metrics::MetricSample;
use std::sync::Arc;
use tracing::{debug, info};

pub const BAR_CELLS: usize = 20;
pub const ONLINE_TEXT: &str = "✅ Your VPS is online.";
pub const OFFLINE_TEXT: &str = "⚠️ **ALERT:** Your VPS appears to be offline! ⚠️";

/// Number of filled cells for a percentage: floor(p / 100 * 20), clamped
pub fn filled_cells(percent: f64) -> usize {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    let filled = (percent / 100.0 * BAR_CELLS as f64).floor() as usize;
    filled.min(BAR_CELLS)
}

/// `[██████              ] 31.25%`
pub fn progress_bar(percent: f64) -> String {
    let filled = filled_cells(percent);
    format!(
        "[{}{}] {:.2}%",
        "█".repeat(filled),
        " ".repeat(BAR_CELLS - filled),
        percent
    )
}

/// Status embed for this cycle; nothing when metrics are unavailable
pub fn present(sample: Option<&MetricSample>, reachable: bool) -> Option<Embed> {
    let sample = sample?;

    let reachability = if reachable { ONLINE_TEXT } else { OFFLINE_TEXT };
    let embed = Embed::new("Server Notification", COLOR_BLUE)
        .description("Here are the latest updates from your VPS.")
        .field("Time", sample.sampled_at.format("%Y-%m-%d %H:%M:%S").to_string(), false)
        .field("CPU Usage", "", false)
        .field("", progress_bar(sample.cpu_percent), false)
        .field("Memory Usage", "", false)
        .field("", progress_bar(sample.memory_percent), false)
        .field(reachability, "", true)
        .footer("VPS Monitoring Bot");
    Some(embed)
}

/// One alert per new login
pub fn login_alert(event: &LoginEvent) -> Embed {
    Embed::new("Login Notification", COLOR_RED).field(
        "🔒 New Login",
        format!("**Login Alert:** {}", event.as_str()),
        false,
    )
}

/// Owner of the one status message of this process
pub struct StatusPresenter {
    chat: Arc<dyn ChatChannel>,
    channel: ChannelHandle,
    handle: Option<MessageHandle>,
}

impl StatusPresenter {
    pub fn new(chat: Arc<dyn ChatChannel>, channel: ChannelHandle) -> Self {
        Self {
            chat,
            channel,
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&MessageHandle> {
        self.handle.as_ref()
    }

    /// Create the status message on first use, edit it afterwards
    ///
    /// A failed edit keeps the handle: the message is never re-created.
    pub async fn publish(&mut self, embed: &Embed) -> Result<MessageHandle, ChannelError> {
        match &self.handle {
            Some(handle) => {
                self.chat.edit(handle, embed).await?;
                debug!("Status message {} edited", handle.message_id);
                Ok(handle.clone())
            }
            None => {
                let handle = self.chat.send(&self.channel, embed).await?;
                info!(
                    "Status message {} created in channel {}",
                    handle.message_id, self.channel.id
                );
                self.handle = Some(handle.clone());
                Ok(handle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn sample(cpu: f64, mem: f64) -> MetricSample {
        MetricSample {
            cpu_percent: cpu,
            memory_percent: mem,
            sampled_at: Local::now(),
        }
    }

    #[test]
    fn test_filled_cells_reference_points() {
        assert_eq!(filled_cells(0.0), 0);
        assert_eq!(filled_cells(50.0), 10);
        assert_eq!(filled_cells(100.0), 20);
        assert_eq!(filled_cells(4.99), 0);
        assert_eq!(filled_cells(5.0), 1);
        assert_eq!(filled_cells(99.99), 19);
    }

    #[test]
    fn test_filled_cells_monotonic_and_floor() {
        let mut previous = 0;
        for step in 0..=1000 {
            let p = step as f64 / 10.0;
            let filled = filled_cells(p);
            assert!(filled >= previous, "not monotonic at {p}");
            assert_eq!(filled, (p / 100.0 * 20.0).floor() as usize);
            previous = filled;
        }
    }

    #[test]
    fn test_filled_cells_clamped() {
        assert_eq!(filled_cells(-3.0), 0);
        assert_eq!(filled_cells(140.0), 20);
        assert_eq!(filled_cells(f64::NAN), 0);
    }

    #[test]
    fn test_progress_bar_text() {
        assert_eq!(progress_bar(50.0), format!("[{}{}] 50.00%", "█".repeat(10), " ".repeat(10)));
        assert_eq!(progress_bar(0.0), format!("[{}] 0.00%", " ".repeat(20)));
        assert_eq!(progress_bar(3.2), format!("[{}] 3.20%", " ".repeat(20)));
    }

    #[test]
    fn test_present_without_sample() {
        assert!(present(None, true).is_none());
        assert!(present(None, false).is_none());
    }

    #[test]
    fn test_present_online() {
        let embed = present(Some(&sample(3.2, 75.0)), true).unwrap();
        let text = embed.text();
        assert!(text.contains(ONLINE_TEXT));
        assert!(!text.contains(OFFLINE_TEXT));
        assert!(text.contains("3.20%"));
        assert!(text.contains("75.00%"));
        assert!(text.contains(&"█".repeat(15)));

        let last = embed.fields.last().unwrap();
        assert_eq!(last.name, ONLINE_TEXT);
        assert!(last.inline);
        assert!(embed.fields[..embed.fields.len() - 1].iter().all(|f| !f.inline));
        assert_eq!(embed.footer.unwrap().text, "VPS Monitoring Bot");
    }

    #[test]
    fn test_present_offline_phrasing() {
        let embed = present(Some(&sample(10.0, 20.0)), false).unwrap();
        let text = embed.text();
        assert!(text.contains(OFFLINE_TEXT));
        assert!(!text.contains(ONLINE_TEXT));
    }

    #[test]
    fn test_login_alert_contains_raw_line() {
        let event = LoginEvent::new("Jan 10 sshd[1]: Accepted password for root from 203.0.113.5");
        let embed = login_alert(&event);
        assert_eq!(embed.title, "Login Notification");
        assert_eq!(
            embed.fields[0].value,
            "**Login Alert:** Jan 10 sshd[1]: Accepted password for root from 203.0.113.5"
        );
    }
}
