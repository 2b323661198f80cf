// ── Message transport seam ──
//
// The monitor and the workers publish through this trait; the production
// implementation is `mqtt::MqttTransport`. Calls enqueue and return
// immediately, delivery happens on the MQTT event loop.

pub use rumqttc::QoS;

use crate::error::CoreError;

pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<(), CoreError>;

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), CoreError>;

    fn unsubscribe(&self, topic: &str) -> Result<(), CoreError>;
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Call {
        Publish { topic: String, payload: String, qos: QoS },
        Subscribe { topic: String, qos: QoS },
        Unsubscribe { topic: String },
    }

    /// Records every call; fails all of them while `fail` is set.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
        fail: AtomicBool,
    }

    impl RecordingTransport {
        pub(crate) fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        #[allow(clippy::unwrap_used)]
        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        #[allow(clippy::unwrap_used)]
        pub(crate) fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub(crate) fn published(&self) -> Vec<(String, serde_json::Value)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Publish { topic, payload, .. } => {
                        Some((topic, serde_json::from_str(&payload).ok()?))
                    }
                    _ => None,
                })
                .collect()
        }

        #[allow(clippy::unwrap_used)]
        fn record(&self, call: Call) -> Result<(), CoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::Publish {
                    topic: "test".into(),
                    reason: "transport down".into(),
                });
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl Transport for RecordingTransport {
        fn publish(&self, topic: &str, payload: String, qos: QoS) -> Result<(), CoreError> {
            self.record(Call::Publish {
                topic: topic.into(),
                payload,
                qos,
            })
        }

        fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), CoreError> {
            self.record(Call::Subscribe {
                topic: topic.into(),
                qos,
            })
        }

        fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
            self.record(Call::Unsubscribe {
                topic: topic.into(),
            })
        }
    }
}
