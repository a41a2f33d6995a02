use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
    #[serde(other)]
    Other,
}

impl fmt::Display for CourseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseLevel::Beginner => write!(f, "Beginner"),
            CourseLevel::Intermediate => write!(f, "Intermediate"),
            CourseLevel::Advanced => write!(f, "Advanced"),
            CourseLevel::Other => write!(f, "Other"),
        }
    }
}

/// Instructor as the backend serializes it: a display name, a user id, or
/// a nested user object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instructor {
    Name(String),
    Id(i64),
    User {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
}

impl Instructor {
    pub fn display_name(&self) -> String {
        match self {
            Instructor::Name(name) => name.clone(),
            Instructor::Id(id) => format!("Instructor #{}", id),
            Instructor::User { name, username } => name
                .clone()
                .or_else(|| username.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
        }
    }
}

/// Category as it appears on a course: an id, a name, or the full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(i64),
    Name(String),
    Detail(Category),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub instructor: Option<Instructor>,
    pub thumbnail: Option<String>,
    pub rating: Option<f64>,
    pub enrolled_students: Option<u64>,
    pub level: Option<CourseLevel>,
    #[serde(default, deserialize_with = "deserialize_decimal")]
    pub price: Option<f64>,
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

impl Course {
    pub fn instructor_name(&self) -> String {
        self.instructor
            .as_ref()
            .map(Instructor::display_name)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn is_free(&self) -> bool {
        self.price.map(|p| p <= 0.0).unwrap_or(true)
    }
}

/// A module (chapter) of a course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration: Option<String>,
    pub content_count: Option<u32>,
    #[serde(default)]
    pub order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Pdf,
    Text,
    #[serde(other)]
    Other,
}

/// One lesson item inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: i64,
    pub title: String,
    pub content_type: ContentType,
    pub file: Option<String>,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub order: i32,
}

/// Response to an enrollment request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrollmentResult {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
}

/// Body of a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub content_id: i64,
    pub progress: u8,
}

impl ProgressUpdate {
    /// Progress is a percentage; anything above 100 is clamped.
    pub fn new(content_id: i64, progress: u8) -> Self {
        Self {
            content_id,
            progress: progress.min(100),
        }
    }

    pub fn completed(content_id: i64) -> Self {
        Self::new(content_id, 100)
    }
}

// Django serializes DecimalField as a string ("19.99"); accept numbers too
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct DecimalVisitor;

    impl<'de> de::Visitor<'de> for DecimalVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a decimal string or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            v.parse::<f64>().map(Some).map_err(de::Error::custom)
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(DecimalVisitor)
}
