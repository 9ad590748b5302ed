//! Logical channel names.
//!
//! Broker topic names are environment configuration; these are the stable logical
//! names the in-process components agree on.

/// Inbound: compartment/asset mutation commands from other services.
pub const COMMAND_TOPIC_COMPARTMENT: &str = "command.compartment";

/// Outbound: asset status events (created, deleted, moved, quantity changed).
pub const EVENT_TOPIC_ASSET_STATUS: &str = "event.asset.status";

/// Outbound: compartment status events (created, reserved, error, ...).
pub const EVENT_TOPIC_COMPARTMENT_STATUS: &str = "event.compartment.status";

/// Outbound: commands for the map/drop service.
pub const COMMAND_TOPIC_DROP: &str = "command.drop";

/// Inbound: status events from the map/drop service.
pub const EVENT_TOPIC_DROP_STATUS: &str = "event.drop.status";

/// Inbound: character lifecycle events.
pub const EVENT_TOPIC_CHARACTER_STATUS: &str = "event.character.status";
