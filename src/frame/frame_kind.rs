use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The role a frame plays within a stream.
///
/// Request kinds open a stream and are only sent by the client. `Next`,
/// `Complete` and `Error` travel from the peer back to the client. `Cancel`
/// is sent by the client to abandon a stream early.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum FrameKind {
    RequestResponse = 1,
    RequestStream = 2,
    Next = 3,
    Complete = 4,
    Error = 5,
    Cancel = 6,
}

impl FrameKind {
    /// Returns `true` for kinds that terminate the stream they belong to.
    pub fn is_terminal(self) -> bool {
        matches!(self, FrameKind::Complete | FrameKind::Error | FrameKind::Cancel)
    }
}
