use thiserror::Error;
use uuid::Uuid;

/// Typed errors at the pipeline's module boundaries (Encoder Supervisor,
/// Bitstream Scanner, SPS Parser, Broadcaster). Every variant here is
/// recovered locally per the policy in each module; none of them is
/// fatal to the agent, so callers log these rather than propagate them
/// as a `Result`. Ambient I/O (config load, socket bind) still goes
/// through plain `anyhow::Result`, matching the donor's split between
/// `thiserror` for typed wire/pipeline errors and `anyhow` at the edges.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to launch encoder candidate {candidate}: {source}")]
    EncoderLaunchFailed {
        candidate: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("encoder candidate {candidate} exited during the settle delay")]
    EncoderEarlyExit { candidate: &'static str },

    #[error("bitstream truncated: {len} leftover bytes discarded with no confirming start code")]
    BitstreamTruncated { len: usize },

    #[error("failed to parse SPS dimensions, continuing with (0, 0)")]
    SpsParseFailed,

    #[error("failed to send to client {client_id}, disconnecting it")]
    ClientSendFailed { client_id: Uuid },

    #[error("failed to decode inbound message from client {client_id}: {source}")]
    ClientDecodeFailed {
        client_id: Uuid,
        #[source]
        source: streamcast_protocol::MessageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_exit_message_names_the_candidate() {
        let err = PipelineError::EncoderEarlyExit { candidate: "x264" };
        assert_eq!(
            err.to_string(),
            "encoder candidate x264 exited during the settle delay"
        );
    }

    #[test]
    fn client_decode_failed_wraps_the_message_error() {
        let err = PipelineError::ClientDecodeFailed {
            client_id: Uuid::nil(),
            source: streamcast_protocol::MessageError::UnknownTag(0xee),
        };
        assert!(err.to_string().contains("unknown message tag"));
    }
}
