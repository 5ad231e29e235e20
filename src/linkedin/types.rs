use serde::{Deserialize, Serialize};

/// Request body for `POST /fetch-profiles`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchProfilesRequest {
    pub profile_urls: Vec<String>,
}

/// Response from `POST /fetch-profiles`; one entry per requested URL,
/// `null` when that profile could not be loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchProfilesResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub profiles: Vec<Option<ProfileData>>,
}

/// Structured LinkedIn profile as returned by the agent service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub accomplishment_courses: Vec<Course>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: Option<String>,
    pub company: Option<String>,
    pub starts_at: Option<YearMark>,
    pub ends_at: Option<YearMark>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub school: Option<String>,
    pub degree_name: Option<String>,
    pub field_of_study: Option<String>,
    pub starts_at: Option<YearMark>,
    pub ends_at: Option<YearMark>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct YearMark {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub name: Option<String>,
}

impl ProfileData {
    /// Minimal profile carrying only a name, for participants without a
    /// LinkedIn URL.
    pub fn from_name(full_name: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            ..Default::default()
        }
    }
}
