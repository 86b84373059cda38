//! Domain records for salonbook.
//!
//! Defines the customer, treatment, and gallery records together with
//! identifier generation and the tag-derived season/color classification
//! used by the gallery filters.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Generates time-based string identifiers.
///
/// Identifiers embed a millisecond timestamp. The generator remembers the
/// last value it issued and bumps to a strictly greater one when the clock
/// has not advanced, so two records created within the same millisecond
/// still get distinct, ordered ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_millis: AtomicI64,
}

impl IdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next millisecond value, strictly greater than any issued
    /// before by this generator.
    pub fn next_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_millis.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => last = observed,
            }
        }
    }

    /// Issue the next identifier.
    #[must_use]
    pub fn next_id(&self) -> String {
        self.next_millis().to_string()
    }
}

/// A customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Time-based identifier.
    pub id: String,
    /// Customer name. The only required field.
    pub name: String,
    /// Phonetic reading of the name.
    #[serde(default)]
    pub kana: String,
    /// Phone number.
    #[serde(default)]
    pub phone: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Birthday, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<NaiveDate>,
    /// Postal address.
    #[serde(default)]
    pub address: String,
    /// Allergy and caution notes.
    #[serde(default)]
    pub allergies: String,
    /// Free-text notes.
    #[serde(default)]
    pub notes: String,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// Stored visit count. Not authoritative; live counts are derived from
    /// the treatment log.
    #[serde(default)]
    pub visit_count: u32,
}

/// Input form for creating a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomer {
    /// Customer name (required).
    pub name: String,
    /// Phonetic reading of the name.
    pub kana: String,
    /// Phone number.
    pub phone: String,
    /// Email address.
    pub email: String,
    /// Birthday, if known.
    pub birthday: Option<NaiveDate>,
    /// Postal address.
    pub address: String,
    /// Allergy and caution notes.
    pub allergies: String,
    /// Free-text notes.
    pub notes: String,
}

impl Customer {
    /// Build a customer record from an input form.
    #[must_use]
    pub fn from_form(id: String, form: NewCustomer) -> Self {
        Self {
            id,
            name: form.name,
            kana: form.kana,
            phone: form.phone,
            email: form.email,
            birthday: form.birthday,
            address: form.address,
            allergies: form.allergies,
            notes: form.notes,
            created_at: Utc::now(),
            visit_count: 0,
        }
    }
}

/// A treatment (service) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treatment {
    /// Time-based identifier.
    pub id: String,
    /// Owning customer id. Not enforced as a foreign key.
    pub customer_id: String,
    /// Date of the visit.
    pub date: NaiveDate,
    /// Menu text (required).
    pub menu: String,
    /// Color used.
    #[serde(default)]
    pub color: String,
    /// Parts applied (stones, foil, ...).
    #[serde(default)]
    pub parts: String,
    /// Nail shape.
    #[serde(default)]
    pub shape: String,
    /// Nail length.
    #[serde(default)]
    pub length: String,
    /// Duration of the treatment in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Price in whole yen.
    pub price: i64,
    /// Staff member who performed the treatment.
    #[serde(default)]
    pub staff: String,
    /// Design tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Suggestion for the next visit.
    #[serde(default)]
    pub next_proposal: String,
    /// Embedded photo data (base64 text).
    #[serde(default)]
    pub photos: Vec<String>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

/// Input form for creating a treatment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTreatment {
    /// Owning customer id (required).
    pub customer_id: String,
    /// Date of the visit (required).
    pub date: Option<NaiveDate>,
    /// Menu text (required).
    pub menu: String,
    /// Color used.
    pub color: String,
    /// Parts applied.
    pub parts: String,
    /// Nail shape.
    pub shape: String,
    /// Nail length.
    pub length: String,
    /// Duration in minutes.
    pub duration_minutes: Option<u32>,
    /// Price in whole yen (required).
    pub price: Option<i64>,
    /// Staff member.
    pub staff: String,
    /// Design tags.
    pub tags: Vec<String>,
    /// Suggestion for the next visit.
    pub next_proposal: String,
    /// Embedded photo data (base64 text).
    pub photos: Vec<String>,
}

/// Split a comma-separated tag string into trimmed, non-empty tags.
#[must_use]
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// A gallery image derived from a treatment photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryImage {
    /// Time-based identifier.
    pub id: String,
    /// Embedded image data (base64 text).
    pub image: String,
    /// Tags inherited from the treatment.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Season classification derived from the tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<Season>,
    /// Color classification derived from the tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<DesignColor>,
    /// Date of the treatment the photo came from.
    pub date: NaiveDate,
    /// Owning customer id. Not enforced as a foreign key.
    pub customer_id: String,
}

impl GalleryImage {
    /// Build a gallery image from a treatment photo, deriving the season
    /// and color classification from the treatment's tags.
    #[must_use]
    pub fn from_treatment_photo(id: String, image: String, treatment: &Treatment) -> Self {
        Self {
            id,
            image,
            tags: treatment.tags.clone(),
            season: classify_season(&treatment.tags),
            color: classify_color(&treatment.tags),
            date: treatment.date,
            customer_id: treatment.customer_id.clone(),
        }
    }
}

/// Season classification for gallery designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// Spring designs.
    Spring,
    /// Summer designs.
    Summer,
    /// Autumn designs.
    Autumn,
    /// Winter designs.
    Winter,
}

impl std::fmt::Display for Season {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spring => write!(f, "spring"),
            Self::Summer => write!(f, "summer"),
            Self::Autumn => write!(f, "autumn"),
            Self::Winter => write!(f, "winter"),
        }
    }
}

/// Color classification for gallery designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignColor {
    /// Pink and rose tones.
    Pink,
    /// Red tones.
    Red,
    /// Blue tones.
    Blue,
    /// White tones.
    White,
    /// Black tones.
    Black,
    /// Beige and nude tones.
    Beige,
}

impl std::fmt::Display for DesignColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pink => write!(f, "pink"),
            Self::Red => write!(f, "red"),
            Self::Blue => write!(f, "blue"),
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
            Self::Beige => write!(f, "beige"),
        }
    }
}

/// Keywords that map a tag to a season. Japanese terms first since most
/// tags are entered in Japanese.
const SEASON_KEYWORDS: &[(Season, &[&str])] = &[
    (Season::Spring, &["春", "桜", "さくら", "スプリング", "spring"]),
    (Season::Summer, &["夏", "海", "サマー", "ビーチ", "summer"]),
    (
        Season::Autumn,
        &["秋", "紅葉", "オータム", "ハロウィン", "autumn"],
    ),
    (
        Season::Winter,
        &["冬", "雪", "ウィンター", "クリスマス", "winter"],
    ),
];

/// Keywords that map a tag to a color family.
const COLOR_KEYWORDS: &[(DesignColor, &[&str])] = &[
    (DesignColor::Pink, &["ピンク", "pink", "ローズ"]),
    (DesignColor::Red, &["レッド", "red", "赤"]),
    (DesignColor::Blue, &["ブルー", "blue", "青", "水色"]),
    (DesignColor::White, &["ホワイト", "white", "白"]),
    (DesignColor::Black, &["ブラック", "black", "黒"]),
    (DesignColor::Beige, &["ベージュ", "beige", "ヌード"]),
];

/// Derive a season from design tags. The first matching season in the
/// fixed spring-to-winter order wins.
#[must_use]
pub fn classify_season(tags: &[String]) -> Option<Season> {
    for (season, keywords) in SEASON_KEYWORDS {
        for tag in tags {
            if keywords.iter().any(|kw| tag.contains(kw)) {
                return Some(*season);
            }
        }
    }
    None
}

/// Derive a color family from design tags. Matching is case-insensitive
/// for Latin keywords.
#[must_use]
pub fn classify_color(tags: &[String]) -> Option<DesignColor> {
    for (color, keywords) in COLOR_KEYWORDS {
        for tag in tags {
            let lowered = tag.to_lowercase();
            if keywords.iter().any(|kw| lowered.contains(kw)) {
                return Some(*color);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_id_generator_monotonic() {
        let ids = IdGenerator::new();
        let a = ids.next_millis();
        let b = ids.next_millis();
        assert!(b > a);
    }

    #[test]
    fn test_id_generator_same_millisecond_disambiguates() {
        // Issuing many ids back to back guarantees several land in the
        // same wall-clock millisecond; all must still be distinct.
        let generator = IdGenerator::new();
        let ids: Vec<String> = (0..100).map(|_| generator.next_id()).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);

        let parsed: Vec<i64> = ids.iter().map(|id| id.parse().unwrap()).collect();
        assert!(parsed.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_customer_from_form() {
        let form = NewCustomer {
            name: "田中 花子".to_string(),
            kana: "たなか はなこ".to_string(),
            phone: "090-1234-5678".to_string(),
            ..NewCustomer::default()
        };
        let customer = Customer::from_form("1735000000000".to_string(), form);

        assert_eq!(customer.id, "1735000000000");
        assert_eq!(customer.name, "田中 花子");
        assert_eq!(customer.visit_count, 0);
        assert!(customer.birthday.is_none());
    }

    #[test]
    fn test_customer_serde_round_trip() {
        let form = NewCustomer {
            name: "佐藤 美咲".to_string(),
            birthday: NaiveDate::from_ymd_opt(1985, 11, 20),
            allergies: "金属アレルギー".to_string(),
            ..NewCustomer::default()
        };
        let customer = Customer::from_form("1".to_string(), form);

        let json = serde_json::to_string(&customer).unwrap();
        let back: Customer = serde_json::from_str(&json).unwrap();
        assert_eq!(customer, back);
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            parse_tags("ピンク, ストーン ,冬"),
            tags(&["ピンク", "ストーン", "冬"])
        );
        assert_eq!(parse_tags(""), Vec::<String>::new());
        assert_eq!(parse_tags(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_gallery_image_from_treatment_photo() {
        let treatment = Treatment {
            id: "t1".to_string(),
            customer_id: "c1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            menu: "ジェルネイル".to_string(),
            color: String::new(),
            parts: String::new(),
            shape: String::new(),
            length: String::new(),
            duration_minutes: Some(90),
            price: 8000,
            staff: "山田".to_string(),
            tags: tags(&["ピンク", "冬"]),
            next_proposal: String::new(),
            photos: vec![],
            created_at: Utc::now(),
        };

        let image =
            GalleryImage::from_treatment_photo("g1".to_string(), "data".to_string(), &treatment);
        assert_eq!(image.customer_id, "c1");
        assert_eq!(image.season, Some(Season::Winter));
        assert_eq!(image.color, Some(DesignColor::Pink));
        assert_eq!(image.date, treatment.date);
        assert_eq!(image.tags, treatment.tags);
    }

    #[test]
    fn test_classify_season() {
        assert_eq!(classify_season(&tags(&["桜ネイル"])), Some(Season::Spring));
        assert_eq!(classify_season(&tags(&["ビーチ"])), Some(Season::Summer));
        assert_eq!(
            classify_season(&tags(&["ハロウィン"])),
            Some(Season::Autumn)
        );
        assert_eq!(
            classify_season(&tags(&["クリスマス"])),
            Some(Season::Winter)
        );
        assert_eq!(classify_season(&tags(&["シンプル"])), None);
        assert_eq!(classify_season(&[]), None);
    }

    #[test]
    fn test_classify_season_order_is_fixed() {
        // A design tagged both spring and winter classifies as spring
        // because the seasons are checked in a fixed order.
        assert_eq!(
            classify_season(&tags(&["冬", "春"])),
            Some(Season::Spring)
        );
    }

    #[test]
    fn test_classify_color() {
        assert_eq!(classify_color(&tags(&["ピンク"])), Some(DesignColor::Pink));
        assert_eq!(classify_color(&tags(&["PINK"])), Some(DesignColor::Pink));
        assert_eq!(classify_color(&tags(&["水色"])), Some(DesignColor::Blue));
        assert_eq!(classify_color(&tags(&["ヌード"])), Some(DesignColor::Beige));
        assert_eq!(classify_color(&tags(&["フレンチ"])), None);
    }

    #[test]
    fn test_season_display_and_serde() {
        assert_eq!(Season::Spring.to_string(), "spring");
        let json = serde_json::to_string(&Season::Autumn).unwrap();
        assert_eq!(json, "\"autumn\"");
    }

    #[test]
    fn test_design_color_display_and_serde() {
        assert_eq!(DesignColor::Beige.to_string(), "beige");
        let json = serde_json::to_string(&DesignColor::Black).unwrap();
        assert_eq!(json, "\"black\"");
    }

    #[test]
    fn test_treatment_serde_defaults() {
        // Older records without optional fields still parse.
        let json = r#"{
            "id": "t1",
            "customer_id": "c1",
            "date": "2024-12-01",
            "menu": "フレンチネイル",
            "price": 6000,
            "created_at": "2024-12-01T00:00:00Z"
        }"#;
        let treatment: Treatment = serde_json::from_str(json).unwrap();
        assert_eq!(treatment.menu, "フレンチネイル");
        assert!(treatment.tags.is_empty());
        assert!(treatment.photos.is_empty());
        assert!(treatment.duration_minutes.is_none());
    }
}
