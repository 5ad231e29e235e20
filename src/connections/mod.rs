//! Connection analysis between two workshop participants.
//!
//! Profiles come from the LinkedIn agent when both participants have a
//! profile URL, otherwise from the directory. The model's reply is parsed
//! into commonalities, recommendations and conversation starters, with a
//! degraded result when the reply is not valid JSON.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AnalysisError, AppError, AppResult};
use crate::linkedin::{LinkedinClient, ProfileData, YearMark};
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::prompts::{connection_prompt, CONNECTION_SYSTEM_PROMPT};
use crate::storage::{NewConnection, Participant, Storage};

const NO_JSON_COMMONALITY: &str = "Unable to extract specific commonalities";
const PARSE_FAILED_COMMONALITY: &str = "Analysis completed";

/// Structured part of the model's reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    #[serde(default)]
    pub commonalities: Vec<String>,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub conversation_starters: Vec<String>,
}

/// A stored connection analysis as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAnalysis {
    pub connection_id: String,
    /// Raw model output.
    pub analysis: String,
    pub commonalities: Vec<String>,
    pub recommendations: String,
    pub conversation_starters: Vec<String>,
}

/// Extract a JSON object from model output: a ```json block, a generic
/// fenced block, or the span from the first `{` to the last `}`.
pub fn extract_json(completion: &str) -> Result<&str, AnalysisError> {
    if let Some(start) = completion.find("```json") {
        if let Some(end) = completion[start + 7..].find("```") {
            return Ok(completion[start + 7..start + 7 + end].trim());
        }
    }

    if let Some(start) = completion.find("```") {
        let after_start = &completion[start + 3..];
        let json_start = after_start.find('\n').map(|n| n + 1).unwrap_or(0);
        if let Some(end) = after_start[json_start..].find("```") {
            let block = after_start[json_start..json_start + end].trim();
            if block.starts_with('{') {
                return Ok(block);
            }
        }
    }

    match (completion.find('{'), completion.rfind('}')) {
        (Some(start), Some(end)) if end > start => Ok(&completion[start..=end]),
        _ => Err(AnalysisError::NoJson),
    }
}

/// Parse the model's reply.
pub fn parse_analysis(completion: &str) -> Result<AnalysisPayload, AnalysisError> {
    let json = extract_json(completion)?;
    Ok(serde_json::from_str(json)?)
}

/// Parse the model's reply, degrading to the raw text as recommendations.
pub fn parse_analysis_or_fallback(completion: &str) -> AnalysisPayload {
    match parse_analysis(completion) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Falling back to unstructured connection analysis");
            let commonality = match e {
                AnalysisError::NoJson => NO_JSON_COMMONALITY,
                AnalysisError::Parse(_) => PARSE_FAILED_COMMONALITY,
            };
            AnalysisPayload {
                commonalities: vec![commonality.to_string()],
                recommendations: completion.to_string(),
                conversation_starters: Vec::new(),
            }
        }
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

fn year(mark: Option<YearMark>, missing: &str) -> String {
    mark.and_then(|m| m.year)
        .map(|y| y.to_string())
        .unwrap_or_else(|| missing.to_string())
}

fn bulleted(lines: Vec<String>) -> String {
    if lines.is_empty() {
        "N/A".to_string()
    } else {
        lines.join("\n")
    }
}

fn joined(items: &[String]) -> String {
    if items.is_empty() {
        "N/A".to_string()
    } else {
        items.join(", ")
    }
}

/// Render a profile as the text block sent to the model.
pub fn format_profile(profile: &ProfileData) -> String {
    let location = match profile.city.as_deref().filter(|c| !c.is_empty()) {
        Some(city) => format!("{}, {}", city, profile.country.as_deref().unwrap_or("")),
        None => "N/A".to_string(),
    };

    let experience = bulleted(
        profile
            .experiences
            .iter()
            .map(|exp| {
                format!(
                    "- {} at {} ({} - {})",
                    exp.title.as_deref().unwrap_or(""),
                    exp.company.as_deref().unwrap_or(""),
                    year(exp.starts_at, "N/A"),
                    year(exp.ends_at, "Present")
                )
            })
            .collect(),
    );

    let education = bulleted(
        profile
            .education
            .iter()
            .map(|edu| {
                format!(
                    "- {} in {} from {} ({} - {})",
                    edu.degree_name.as_deref().unwrap_or("Degree"),
                    or_na(edu.field_of_study.as_deref()),
                    edu.school.as_deref().unwrap_or(""),
                    year(edu.starts_at, "N/A"),
                    year(edu.ends_at, "N/A")
                )
            })
            .collect(),
    );

    let certifications: Vec<String> = profile
        .accomplishment_courses
        .iter()
        .filter_map(|c| c.name.clone())
        .collect();

    format!(
        "Name: {}\nHeadline: {}\nLocation: {}\nSummary: {}\n\n\
         Experience:\n{}\n\n\
         Education:\n{}\n\n\
         Skills:\n{}\n\n\
         Languages:\n{}\n\n\
         Certifications:\n{}",
        profile
            .full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Unknown"),
        or_na(profile.headline.as_deref()),
        location,
        or_na(profile.summary.as_deref()),
        experience,
        education,
        joined(&profile.skills),
        joined(&profile.languages),
        joined(&certifications),
    )
}

/// Analyzes and stores connections between participants.
#[derive(Clone)]
pub struct ConnectionAnalyzer {
    storage: Arc<dyn Storage>,
    linkedin: LinkedinClient,
    llm: Option<LlmClient>,
    model: String,
}

impl ConnectionAnalyzer {
    pub fn new(
        storage: Arc<dyn Storage>,
        linkedin: LinkedinClient,
        llm: Option<LlmClient>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            linkedin,
            llm,
            model: model.into(),
        }
    }

    async fn profiles(
        &self,
        first: &Participant,
        second: &Participant,
    ) -> AppResult<(ProfileData, ProfileData)> {
        if first.linkedin_profile.trim().is_empty() || second.linkedin_profile.trim().is_empty() {
            info!(
                participant1 = %first.id,
                participant2 = %second.id,
                "Missing LinkedIn profile URL, analyzing from directory data"
            );
            return Ok((
                ProfileData::from_name(first.full_name()),
                ProfileData::from_name(second.full_name()),
            ));
        }

        Ok(self
            .linkedin
            .fetch_profile_pair(&first.linkedin_profile, &second.linkedin_profile)
            .await?)
    }

    /// Analyze a pair, store the result and return it with its id.
    pub async fn analyze_connection(
        &self,
        participant1_id: &str,
        participant2_id: &str,
    ) -> AppResult<ConnectionAnalysis> {
        let first = self.storage.get_participant(participant1_id).await?;
        let second = self.storage.get_participant(participant2_id).await?;
        let (Some(first), Some(second)) = (first, second) else {
            return Err(AppError::NotFound {
                message: "One or both participants not found".to_string(),
            });
        };

        let llm = self.llm.as_ref().ok_or_else(|| AppError::Config {
            message: "OpenAI API key not configured".to_string(),
        })?;

        let (profile1, profile2) = self.profiles(&first, &second).await?;

        let request = ChatRequest::new(
            &self.model,
            vec![
                ChatMessage::system(CONNECTION_SYSTEM_PROMPT),
                ChatMessage::user(connection_prompt(
                    &format_profile(&profile1),
                    &format_profile(&profile2),
                )),
            ],
        );
        let analysis = llm.complete(request).await?;
        let payload = parse_analysis_or_fallback(&analysis);

        let connection_id = self
            .storage
            .insert_connection(NewConnection {
                participant1_id: first.id.clone(),
                participant2_id: second.id.clone(),
                analysis: analysis.clone(),
                commonalities: payload.commonalities.clone(),
                recommendations: payload.recommendations.clone(),
                created_at: Utc::now().timestamp_millis(),
            })
            .await?;

        info!(
            connection_id = %connection_id,
            commonalities = payload.commonalities.len(),
            "Connection analysis stored"
        );

        Ok(ConnectionAnalysis {
            connection_id,
            analysis,
            commonalities: payload.commonalities,
            recommendations: payload.recommendations,
            conversation_starters: payload.conversation_starters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkedinConfig, RequestConfig};
    use crate::linkedin::{Course, Education, Experience};
    use crate::storage::{MockStorage, NewParticipant};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_json_variants() {
        let fenced = "Sure!\n```json\n{\"a\": 1}\n```\nDone";
        assert_eq!(extract_json(fenced).unwrap(), "{\"a\": 1}");

        let generic = "```\n{\"a\": 2}\n```";
        assert_eq!(extract_json(generic).unwrap(), "{\"a\": 2}");

        let prose = "Here you go: {\"a\": {\"b\": 3}} hope it helps";
        assert_eq!(extract_json(prose).unwrap(), "{\"a\": {\"b\": 3}}");

        assert!(matches!(extract_json("no braces here"), Err(AnalysisError::NoJson)));
    }

    #[test]
    fn test_parse_analysis() {
        let payload = parse_analysis(
            r#"{"commonalities": ["Rust"], "recommendations": "Pair up", "conversationStarters": ["Ask about crates"]}"#,
        )
        .unwrap();
        assert_eq!(payload.commonalities, vec!["Rust"]);
        assert_eq!(payload.conversation_starters, vec!["Ask about crates"]);
    }

    #[test]
    fn test_fallback_without_json() {
        let payload = parse_analysis_or_fallback("They both like hiking.");
        assert_eq!(payload.commonalities, vec![NO_JSON_COMMONALITY]);
        assert_eq!(payload.recommendations, "They both like hiking.");
        assert!(payload.conversation_starters.is_empty());
    }

    #[test]
    fn test_fallback_on_invalid_json() {
        let raw = "{commonalities: [oops]}";
        let payload = parse_analysis_or_fallback(raw);
        assert_eq!(payload.commonalities, vec![PARSE_FAILED_COMMONALITY]);
        assert_eq!(payload.recommendations, raw);
    }

    #[test]
    fn test_format_profile_full() {
        let profile = ProfileData {
            full_name: Some("Ada Lovelace".into()),
            headline: Some("Analyst".into()),
            city: Some("London".into()),
            country: Some("UK".into()),
            summary: None,
            experiences: vec![Experience {
                title: Some("Programmer".into()),
                company: Some("Engine Co".into()),
                starts_at: Some(YearMark { year: Some(1842) }),
                ends_at: None,
            }],
            education: vec![Education {
                school: Some("Home".into()),
                degree_name: None,
                field_of_study: Some("Mathematics".into()),
                starts_at: None,
                ends_at: None,
            }],
            skills: vec!["Math".into(), "Poetry".into()],
            languages: vec![],
            accomplishment_courses: vec![Course {
                name: Some("Notes".into()),
            }],
        };

        let text = format_profile(&profile);
        assert!(text.starts_with("Name: Ada Lovelace\nHeadline: Analyst\nLocation: London, UK\nSummary: N/A"));
        assert!(text.contains("Experience:\n- Programmer at Engine Co (1842 - Present)"));
        assert!(text.contains("Education:\n- Degree in Mathematics from Home (N/A - N/A)"));
        assert!(text.contains("Skills:\nMath, Poetry"));
        assert!(text.contains("Languages:\nN/A"));
        assert!(text.contains("Certifications:\nNotes"));
    }

    #[test]
    fn test_format_profile_name_only() {
        let text = format_profile(&ProfileData::from_name("Grace Hopper"));
        assert!(text.starts_with("Name: Grace Hopper\nHeadline: N/A\nLocation: N/A"));
        assert!(text.contains("Experience:\nN/A"));
    }

    fn analyzer(storage: MockStorage) -> ConnectionAnalyzer {
        let linkedin = LinkedinClient::new(
            &LinkedinConfig {
                agent_url: "http://127.0.0.1:9".to_string(),
            },
            RequestConfig::default(),
        )
        .unwrap();
        ConnectionAnalyzer::new(Arc::new(storage), linkedin, None, "gpt-4o")
    }

    #[tokio::test]
    async fn test_missing_participant_is_not_found() {
        let mut storage = MockStorage::new();
        storage.expect_get_participant().returning(|_| Ok(None));
        storage.expect_insert_connection().never();

        let err = analyzer(storage)
            .analyze_connection("a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        assert_eq!(err.to_string(), "Not found: One or both participants not found");
    }

    #[tokio::test]
    async fn test_missing_llm_key_is_configuration_error() {
        let mut storage = MockStorage::new();
        storage.expect_get_participant().returning(|id| {
            let mut p = Participant::new(NewParticipant {
                first_name: "Test".into(),
                last_name: id.to_string(),
                linkedin_image: String::new(),
                email: format!("{}@example.com", id),
                linkedin_profile: String::new(),
            });
            p.id = id.to_string();
            Ok(Some(p))
        });
        storage.expect_insert_connection().never();

        let err = analyzer(storage)
            .analyze_connection("a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }
}
