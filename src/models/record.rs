use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const COL_OWNER: &str = "User_ID";
pub const COL_NAME: &str = "Name";
pub const COL_CATEGORY: &str = "Kategorie";
pub const COL_COUNT: &str = "Stückzahl";
pub const COL_UNIT_MASS: &str = "NEM_pro_Stück";
pub const COL_IMAGE_PATH: &str = "Bild_Pfad";
pub const COL_HIGHLIGHT: &str = "Highlight";

/// Header row of the inventory sheet, in stored column order.
pub const HEADER: [&str; 7] = [
    COL_OWNER,
    COL_NAME,
    COL_CATEGORY,
    COL_COUNT,
    COL_UNIT_MASS,
    COL_IMAGE_PATH,
    COL_HIGHLIGHT,
];

/// Namespace for record ids (UUID v5 over owner, name and occurrence).
const RECORD_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b4e_8d3a_4c57_9e21_f0a4_b7c3_d915);

/// Stable identifier of a record within its owner's partition.
///
/// Not persisted: it is derived from `(owner, name, n)` where `n` counts
/// earlier records of the same owner with the same name, so two loads of an
/// unchanged sheet yield the same ids and duplicate names stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn derive(owner: &str, name: &str, occurrence: usize) -> Self {
        let key = format!("{}\u{1f}{}\u{1f}{}", owner, name, occurrence);
        Self(Uuid::new_v5(&RECORD_ID_NAMESPACE, key.as_bytes()))
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Item category. The fixed choices carry the labels stored in the sheet;
/// anything else is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Battery,
    Compound,
    Rockets,
    SingleShot,
    Sparklers,
    Bangers,
    #[default]
    Misc,
    Other(String),
}

impl Category {
    pub const CHOICES: [Category; 7] = [
        Category::Battery,
        Category::Compound,
        Category::Rockets,
        Category::SingleShot,
        Category::Sparklers,
        Category::Bangers,
        Category::Misc,
    ];

    pub fn from_label(label: &str) -> Self {
        match label {
            "Batterie" => Self::Battery,
            "Verbund" => Self::Compound,
            "Raketen" => Self::Rockets,
            "Single Shot" => Self::SingleShot,
            "Leuchtfeuerwerk" => Self::Sparklers,
            "Böller" => Self::Bangers,
            "Sonstiges" => Self::Misc,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Battery => "Batterie",
            Self::Compound => "Verbund",
            Self::Rockets => "Raketen",
            Self::SingleShot => "Single Shot",
            Self::Sparklers => "Leuchtfeuerwerk",
            Self::Bangers => "Böller",
            Self::Misc => "Sonstiges",
            Self::Other(label) => label,
        }
    }
}

/// Presentational highlight color of an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Highlight {
    Green,
    Yellow,
    Red,
    #[default]
    None,
}

impl Highlight {
    /// Accepts the stored labels and their English names.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Grün" | "Green" => Some(Self::Green),
            "Gelb" | "Yellow" => Some(Self::Yellow),
            "Rot" | "Red" => Some(Self::Red),
            "Kein" | "None" => Some(Self::None),
            _ => None,
        }
    }

    /// Unknown and empty labels fall back to `None`.
    pub fn from_label_lenient(label: &str) -> Self {
        Self::from_label(label).unwrap_or_default()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Green => "Grün",
            Self::Yellow => "Gelb",
            Self::Red => "Rot",
            Self::None => "Kein",
        }
    }

    pub fn color_hex(&self) -> &'static str {
        match self {
            Self::Green => "#008000",
            Self::Yellow => "#FFD700",
            Self::Red => "#FF4500",
            Self::None => "transparent",
        }
    }
}

/// One inventory item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub owner: String,
    pub name: String,
    pub category: Category,
    pub count: u32,
    /// Net explosive mass per unit, grams.
    pub unit_mass: f64,
    pub image_path: String,
    pub highlight: Highlight,
}

impl Record {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: RecordId::nil(),
            owner: owner.into(),
            name: name.into(),
            category: Category::default(),
            count: 1,
            unit_mass: 0.0,
            image_path: String::new(),
            highlight: Highlight::None,
        }
    }

    /// Total net explosive mass of this row, grams.
    pub fn total_mass(&self) -> f64 {
        f64::from(self.count) * self.unit_mass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_is_deterministic() {
        let a = RecordId::derive("anna", "Vulkan", 0);
        assert_eq!(a, RecordId::derive("anna", "Vulkan", 0));
        assert_ne!(a, RecordId::derive("anna", "Vulkan", 1));
        assert_ne!(a, RecordId::derive("ben", "Vulkan", 0));
        assert_eq!(RecordId::parse(&a.to_string()), Some(a));
        assert_eq!(RecordId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_highlight_labels() {
        assert_eq!(Highlight::from_label("Grün"), Some(Highlight::Green));
        assert_eq!(Highlight::from_label("Red"), Some(Highlight::Red));
        assert_eq!(Highlight::from_label("Lila"), None);
        assert_eq!(Highlight::from_label_lenient(""), Highlight::None);
        for h in [Highlight::Green, Highlight::Yellow, Highlight::Red, Highlight::None] {
            assert_eq!(Highlight::from_label(h.label()), Some(h));
        }
    }

    #[test]
    fn test_category_keeps_free_text() {
        assert_eq!(Category::from_label("Böller"), Category::Bangers);
        let custom = Category::from_label("Fontäne");
        assert_eq!(custom, Category::Other("Fontäne".to_string()));
        assert_eq!(custom.label(), "Fontäne");
        for c in Category::CHOICES {
            assert_eq!(Category::from_label(c.label()), c);
        }
    }
}
