/// A typed message that knows where it is routed.
///
/// Messages are:
/// - **immutable** (treat them as facts or requests, never edit after publishing)
/// - **self-routing** (`topic()` + `key()`)
/// - **tagged** (`message_type()` is the wire discriminator, e.g. `"MOVED"`)
pub trait Message: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Logical channel the message is published on.
    fn topic(&self) -> &'static str;

    /// Partition key (the character id for every inventory message).
    fn key(&self) -> String;

    /// Stable wire discriminator.
    fn message_type(&self) -> &'static str;
}
