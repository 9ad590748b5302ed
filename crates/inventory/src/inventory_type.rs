use serde::{Deserialize, Serialize};

use stowage_core::{DomainError, DomainResult, TemplateId};

/// Inventory tab category.
///
/// Serialized as its numeric code (`1..=5`), which is also how templates are
/// classified: `template_id / 1_000_000`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum InventoryType {
    Equip = 1,
    Use = 2,
    Setup = 3,
    Etc = 4,
    Cash = 5,
}

impl InventoryType {
    pub const ALL: [InventoryType; 5] = [
        InventoryType::Equip,
        InventoryType::Use,
        InventoryType::Setup,
        InventoryType::Etc,
        InventoryType::Cash,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Classify a catalog template into the compartment that holds it.
    pub fn from_template(template_id: TemplateId) -> DomainResult<Self> {
        let category = template_id.value() / 1_000_000;
        u8::try_from(category)
            .ok()
            .and_then(|c| Self::try_from(c).ok())
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "template {template_id} does not belong to any inventory type"
                ))
            })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            InventoryType::Equip => "equip",
            InventoryType::Use => "use",
            InventoryType::Setup => "setup",
            InventoryType::Etc => "etc",
            InventoryType::Cash => "cash",
        }
    }
}

impl TryFrom<u8> for InventoryType {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(InventoryType::Equip),
            2 => Ok(InventoryType::Use),
            3 => Ok(InventoryType::Setup),
            4 => Ok(InventoryType::Etc),
            5 => Ok(InventoryType::Cash),
            other => Err(DomainError::validation(format!(
                "unknown inventory type {other}"
            ))),
        }
    }
}

impl From<InventoryType> for u8 {
    fn from(value: InventoryType) -> Self {
        value.code()
    }
}

impl core::fmt::Display for InventoryType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
