use bitflags::bitflags;

bitflags! {
    /// Frame flag bits (16-bit, big-endian on the wire).
    ///
    /// Only `START` and `END` are defined; a frame carrying any other bit
    /// is rejected during decode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u16 {
        /// First frame of a logical message.
        const START = 0x0001;
        /// Last frame of a logical message.
        const END = 0x0002;
    }
}

impl FrameFlags {
    /// Flags carried by a message that fits in a single frame.
    pub const WHOLE: FrameFlags = FrameFlags::START.union(FrameFlags::END);
}
