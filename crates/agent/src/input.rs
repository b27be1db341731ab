use streamcast_protocol::{InputEvent, MessageError};
use uuid::Uuid;

use crate::error::PipelineError;

/// Decodes one inbound binary message and logs the resulting input
/// event. Injection is explicitly out of scope: this is diagnostic
/// only. Malformed or unknown messages are dropped silently, the
/// connection stays open.
pub fn handle_inbound(client_id: Uuid, data: &[u8]) {
    match InputEvent::deserialize(data) {
        Ok(InputEvent::PointerMove { x, y }) => {
            tracing::debug!(%client_id, x, y, "pointer move");
        }
        Ok(InputEvent::PointerButton { button }) => {
            tracing::debug!(%client_id, button, "pointer button");
        }
        Ok(InputEvent::Key { key, pressed }) => {
            tracing::debug!(%client_id, key, pressed, "key event");
        }
        Err(MessageError::UnknownTag(tag)) => {
            tracing::debug!(%client_id, tag = format!("{tag:#04x}"), "unknown input tag, dropped");
        }
        Err(source) => {
            let err = PipelineError::ClientDecodeFailed { client_id, source };
            tracing::debug!(error = %err, "dropped, connection stays open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_panic_on_empty_message() {
        handle_inbound(Uuid::nil(), &[]);
    }

    #[test]
    fn does_not_panic_on_unknown_tag() {
        handle_inbound(Uuid::nil(), &[0xaa, 1, 2, 3]);
    }

    #[test]
    fn does_not_panic_on_valid_events() {
        handle_inbound(Uuid::nil(), &[0x10, 0x01, 0x40, 0x01, 0x90]);
        handle_inbound(Uuid::nil(), &[0x11, 2]);
        handle_inbound(Uuid::nil(), &[0x20, 0x00, 0x41, 0x01]);
    }
}
