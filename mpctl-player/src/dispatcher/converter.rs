//! Raw bus message to [`InnerMessage`] conversion

use super::message::{ElementInfo, InnerMessage};
use crate::error::{Error, Result};
use crate::pipeline::{ErrorDomain, RawBody, RawMessage};
use mpctl_common::ErrorCode;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of converting one raw message
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Message(InnerMessage),
    /// Recognised but of no interest to the controller
    Ignored,
}

/// Pluggable conversion from engine messages to inner messages
pub trait MessageConverter: Send {
    fn convert(&self, raw: &RawMessage) -> Result<Conversion>;
}

/// Buffering reports from this element family are not forwarded
const IGNORED_BUFFERING_PREFIX: &str = "queue2";

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageConverter;

impl MessageConverter for DefaultMessageConverter {
    fn convert(&self, raw: &RawMessage) -> Result<Conversion> {
        let msg = match &raw.body {
            RawBody::StateChanged { old, new, pending } => {
                debug!("{} changed state from {} to {}", raw.source, old, new);
                InnerMessage::StateChanged {
                    old: *old,
                    new: *new,
                    pending: *pending,
                    from_pipeline: raw.source_is_pipeline,
                }
            }
            RawBody::AsyncDone => InnerMessage::AsyncDone,
            RawBody::Eos => InnerMessage::Eos,
            RawBody::Error { domain, text } => {
                warn!("[ERROR] {}: {}", raw.source, text);
                InnerMessage::Error {
                    code: error_code(*domain),
                    text: text.clone(),
                }
            }
            RawBody::Warning { text } => {
                warn!("[WARNING] {}: {}", raw.source, text);
                InnerMessage::Warning { text: text.clone() }
            }
            RawBody::Info { text } => {
                info!("[INFO] {}: {}", raw.source, text);
                InnerMessage::Info { text: text.clone() }
            }
            RawBody::DurationChanged => InnerMessage::DurationChanged,
            RawBody::Buffering { percent } => {
                if raw.source.starts_with(IGNORED_BUFFERING_PREFIX) {
                    debug!("buffering message from {} not handled", raw.source);
                    return Ok(Conversion::Ignored);
                }
                InnerMessage::Buffering { percent: *percent }
            }
            RawBody::Element { structure, fields } => {
                return convert_element(structure, fields);
            }
            RawBody::ElementSetup { element, factory } => InnerMessage::ElementSetup(ElementInfo {
                name: element.clone(),
                factory: factory.clone(),
            }),
        };
        Ok(Conversion::Message(msg))
    }
}

fn error_code(domain: ErrorDomain) -> ErrorCode {
    match domain {
        ErrorDomain::Resource | ErrorDomain::Stream => ErrorCode::EngineFailure,
        ErrorDomain::Core | ErrorDomain::Library => ErrorCode::Unknown,
    }
}

fn field(structure: &str, fields: &HashMap<String, i64>, key: &str) -> Result<i64> {
    fields
        .get(key)
        .copied()
        .ok_or_else(|| Error::InvalidValue(format!("{} without '{}'", structure, key)))
}

fn narrow<T: TryFrom<i64>>(structure: &str, key: &str, value: i64) -> Result<T> {
    T::try_from(value).map_err(|_| Error::InvalidValue(format!("{}.{} out of range: {}", structure, key, value)))
}

fn convert_element(structure: &str, fields: &HashMap<String, i64>) -> Result<Conversion> {
    let msg = match structure {
        "resolution-changed" => {
            let width: i32 = narrow(structure, "width", field(structure, fields, "width")?)?;
            let height: i32 = narrow(structure, "height", field(structure, fields, "height")?)?;
            info!("resolution changed to width:{} height:{}", width, height);
            InnerMessage::ResolutionChanged { width, height }
        }
        "message-buffering-time" => {
            let queue_id: u32 = narrow(structure, "queue-id", field(structure, fields, "queue-id")?)?;
            let time_ns = field(structure, fields, "buffering-time")?;
            debug!("queue {} buffering time {} ns", queue_id, time_ns);
            InnerMessage::BufferingTime { queue_id, time_ns }
        }
        "message-mq-num-use-buffering" => {
            let count: u32 = narrow(structure, "count", field(structure, fields, "count")?)?;
            debug!("{} queues used for buffering", count);
            InnerMessage::BufferingUsedQueues { count }
        }
        other => {
            debug!("element message {} not handled", other);
            return Ok(Conversion::Ignored);
        }
    };
    Ok(Conversion::Message(msg))
}
