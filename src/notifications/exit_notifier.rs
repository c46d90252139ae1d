//! Báo cho chủ vị thế khi quy tắc auto-exit bắn

use std::sync::Arc;

use async_trait::async_trait;

use common::{ExitEvent, ExitTrigger};

use crate::errors::Result;
use crate::notifications::{escape_html, MessageSender};
use crate::tradelogic::ExitListener;

pub struct AutoExitNotifier {
    sender: Arc<dyn MessageSender>,
}

impl AutoExitNotifier {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }
}

fn format_exit(event: &ExitEvent) -> String {
    let rule = &event.rule;
    let (icon, kind) = match event.trigger {
        ExitTrigger::TakeProfit => ("🎯", "Take profit"),
        ExitTrigger::StopLoss => ("🛑", "Stop loss"),
    };
    format!(
        "{} <b>{} hit</b>\nToken: <code>{}</code>\nPrice: ${}\nPosition: {}\nSell order handed off for wallet <code>{}</code>",
        icon,
        kind,
        escape_html(&rule.token_address),
        event.price_usd,
        escape_html(&rule.position_id),
        escape_html(&rule.wallet)
    )
}

#[async_trait]
impl ExitListener for AutoExitNotifier {
    fn name(&self) -> &str {
        "exit-notifier"
    }

    /// Send errors are returned so the engine can retry
    async fn on_exit(&self, event: &ExitEvent) -> Result<()> {
        self.sender.send(event.rule.owner_id, &format_exit(event)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriberId;
    use chrono::Utc;
    use common::ExitRule;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(SubscriberId, String)>>,
    }

    #[async_trait]
    impl MessageSender for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn send(&self, recipient: SubscriberId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((recipient, text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifies_rule_owner() {
        let recorder = Arc::new(Recorder::default());
        let notifier = AutoExitNotifier::new(recorder.clone());
        let event = ExitEvent {
            rule: ExitRule {
                position_id: "pos-9".to_string(),
                owner_id: 77,
                wallet: "EQwallet".to_string(),
                token_address: "EQtoken".to_string(),
                trigger_price_usd: 2.0,
                stop_price_usd: Some(1.0),
                created_at: Utc::now(),
            },
            price_usd: 0.8,
            trigger: ExitTrigger::StopLoss,
            fired_at: Utc::now(),
        };

        notifier.on_exit(&event).await.unwrap();
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 77);
        assert!(sent[0].1.contains("Stop loss"));
        assert!(sent[0].1.contains("pos-9"));
    }
}
