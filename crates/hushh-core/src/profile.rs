//! Profile merger: fold several agents' answers into one resolved profile
//!
//! Each agent's contribution may be a JSON object, a JSON-encoded string
//! (optionally wrapped in markdown code fences), or a response envelope whose
//! text is such a string. A `userProfile` key is unwrapped. Contributions are
//! shallow-merged in [`MergePriority`] order, so later agents overwrite earlier
//! fields. A string that cannot be parsed is logged and skipped; an envelope
//! whose text is not a profile is merged as the object it is.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::extract::{self, lookup};
use crate::types::{AgentOutcome, DispatchResult};

/// Keys that mark a response envelope rather than a bare profile object
const ENVELOPE_KEYS: &[&str] = &["jsonrpc", "result", "choices", "candidates"];

/// Agent ids in merge order; later entries win on key collision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergePriority(pub Vec<String>);

impl Default for MergePriority {
    fn default() -> Self {
        Self(
            ["brand", "hushh", "public", "gemini"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl MergePriority {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Merged view of a user's attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProfile {
    pub fields: Map<String, Value>,
    /// Agent ids whose contribution was merged, in merge order
    pub contributors: Vec<String>,
}

impl ResolvedProfile {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shallow merge; incoming keys overwrite existing ones
    pub fn merge(&mut self, agent_id: &str, object: Map<String, Value>) {
        debug!("Merging {} fields from {}", object.len(), agent_id);
        for (key, value) in object {
            self.fields.insert(key, value);
        }
        self.contributors.push(agent_id.to_string());
    }

    /// Raw value at a plain key or dotted path
    pub fn resolve(&self, alias: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(alias) {
            return Some(value);
        }
        let (head, rest) = alias.split_once('.')?;
        self.fields.get(head).and_then(|v| lookup(v, rest))
    }

    /// First alias that holds a non-empty value, rendered as display text
    pub fn get_field(&self, aliases: &[&str]) -> Option<String> {
        aliases
            .iter()
            .find_map(|alias| self.resolve(alias).and_then(render_value))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Render a JSON value for display; `None` for null and empty values
pub fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().filter_map(render_value).collect();
            if rendered.is_empty() { None } else { Some(rendered.join(", ")) }
        }
        Value::Object(map) if map.is_empty() => None,
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Inner text of the first ```` ``` ```` or ```` ```json ```` fence, which may
/// follow prose. Bare JSON is returned trimmed.
pub fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    if s.starts_with('{') || s.starts_with('[') {
        return s;
    }
    let Some(open) = s.find("```") else {
        return s;
    };
    let after = &s[open + 3..];
    // Drop the info string ("json", "JSON", ...) up to the first newline
    let body = match after.find('\n') {
        Some(idx) if after[..idx].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &after[idx + 1..]
        }
        _ => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse fenced or bare JSON text into an object
pub fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    let parsed: Value = serde_json::from_str(strip_code_fences(raw)).map_err(|e| e.to_string())?;
    match parsed {
        Value::Object(map) => Ok(map),
        // Double-encoded: a JSON string holding the JSON object
        Value::String(inner) => match serde_json::from_str::<Value>(strip_code_fences(&inner)) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("decoded string is not a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        },
        other => Err(format!("expected a JSON object, found {}", json_type(&other))),
    }
}

/// The object an agent contributes to the profile, if any
pub fn parse_agent_value(agent_id: &str, value: &Value) -> Option<Map<String, Value>> {
    let object = match value {
        Value::String(raw) => match parse_json_object(raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("Skipping {} profile data: {}", agent_id, e);
                return None;
            }
        },
        Value::Object(map) if is_envelope(map) => {
            let strategies: [fn(&Value) -> Option<String>; 3] =
                [extract::from_known_paths, extract::from_parts, extract::from_choices];
            let text = strategies.iter().find_map(|strategy| strategy(value));
            match text.as_deref().map(parse_json_object) {
                Some(Ok(inner)) => inner,
                Some(Err(e)) => {
                    debug!(
                        "{} response text is not a profile ({}), merging the object",
                        agent_id, e
                    );
                    map.clone()
                }
                None => {
                    debug!("{} response carried no text, merging the object", agent_id);
                    map.clone()
                }
            }
        }
        Value::Object(map) => map.clone(),
        other => {
            warn!("Skipping {} profile data: unexpected {}", agent_id, json_type(other));
            return None;
        }
    };
    Some(unwrap_user_profile(object))
}

fn unwrap_user_profile(mut object: Map<String, Value>) -> Map<String, Value> {
    match object.remove("userProfile") {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            object.insert("userProfile".to_string(), other);
            object
        }
        None => object,
    }
}

fn is_envelope(map: &Map<String, Value>) -> bool {
    !map.contains_key("userProfile") && ENVELOPE_KEYS.iter().any(|k| map.contains_key(*k))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Merge agent results in priority order. Missing agents, failed calls and
/// unparseable data contribute nothing.
pub fn merge_profiles(
    priority: &MergePriority,
    results: &HashMap<String, DispatchResult>,
) -> ResolvedProfile {
    let mut profile = ResolvedProfile::default();
    for agent_id in priority.iter() {
        let Some(result) = results.get(agent_id) else {
            debug!("No result from {}, skipping", agent_id);
            continue;
        };
        if !result.success {
            let error = result.error.as_deref().unwrap_or("unknown error");
            debug!("{} failed ({}), skipping", agent_id, error);
            continue;
        }
        let Some(data) = result.data.as_ref() else {
            continue;
        };
        if let Some(object) = parse_agent_value(agent_id, data) {
            profile.merge(agent_id, object);
        }
    }
    profile
}

/// [`merge_profiles`] over a batch's outcomes
pub fn merge_outcomes(priority: &MergePriority, outcomes: &[AgentOutcome]) -> ResolvedProfile {
    let results: HashMap<String, DispatchResult> = outcomes
        .iter()
        .map(|o| (o.agent_id.clone(), o.result.clone()))
        .collect();
    merge_profiles(priority, &results)
}

/// Alias lists for profile fields: snake_case, camelCase, PascalCase and synonyms
pub mod fields {
    pub const FULL_NAME: &[&str] = &[
        "full_name",
        "fullName",
        "FullName",
        "name",
        "Name",
        "user_name",
        "userName",
    ];
    pub const FIRST_NAME: &[&str] = &["first_name", "firstName", "FirstName", "given_name"];
    pub const LAST_NAME: &[&str] = &["last_name", "lastName", "LastName", "family_name", "surname"];
    pub const EMAIL: &[&str] = &[
        "email",
        "Email",
        "email_address",
        "emailAddress",
        "contact.email",
    ];
    pub const PHONE: &[&str] = &[
        "phone",
        "Phone",
        "phone_number",
        "phoneNumber",
        "PhoneNumber",
        "mobile",
        "contact.phone",
    ];
    pub const AGE: &[&str] = &["age", "Age"];
    pub const GENDER: &[&str] = &["gender", "Gender", "sex"];
    pub const CITY: &[&str] = &[
        "city",
        "City",
        "address.city",
        "location.city",
        "current_city",
        "currentCity",
    ];
    pub const STATE: &[&str] = &["state", "State", "region", "address.state", "location.state"];
    pub const COUNTRY: &[&str] = &[
        "country",
        "Country",
        "address.country",
        "location.country",
        "nationality",
    ];
    pub const OCCUPATION: &[&str] = &[
        "occupation",
        "Occupation",
        "job_title",
        "jobTitle",
        "profession",
        "title",
    ];
    pub const COMPANY: &[&str] = &[
        "company",
        "Company",
        "employer",
        "organization",
        "work.company",
    ];
    pub const EDUCATION: &[&str] = &["education", "Education", "education_level", "educationLevel"];
    pub const INCOME: &[&str] = &[
        "income",
        "Income",
        "annual_income",
        "annualIncome",
        "income_range",
        "incomeRange",
    ];
    pub const INTERESTS: &[&str] = &["interests", "Interests", "hobbies", "preferences"];
    pub const BRANDS: &[&str] = &[
        "brands",
        "favorite_brands",
        "favoriteBrands",
        "brand_affinity",
        "brandAffinity",
    ];
}

/// Typed view of a resolved profile. `None` means no agent supplied the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub occupation: Option<String>,
    pub company: Option<String>,
    pub education: Option<String>,
    pub income: Option<String>,
    pub interests: Option<String>,
    pub brands: Option<String>,
}

impl ProfileSummary {
    pub fn from_profile(profile: &ResolvedProfile) -> Self {
        let full_name = profile.get_field(fields::FULL_NAME).or_else(|| {
            let parts: Vec<String> = [fields::FIRST_NAME, fields::LAST_NAME]
                .iter()
                .filter_map(|aliases| profile.get_field(aliases))
                .collect();
            if parts.is_empty() { None } else { Some(parts.join(" ")) }
        });

        Self {
            full_name,
            email: profile.get_field(fields::EMAIL),
            phone: profile.get_field(fields::PHONE),
            age: profile.get_field(fields::AGE),
            gender: profile.get_field(fields::GENDER),
            city: profile.get_field(fields::CITY),
            state: profile.get_field(fields::STATE),
            country: profile.get_field(fields::COUNTRY),
            occupation: profile.get_field(fields::OCCUPATION),
            company: profile.get_field(fields::COMPANY),
            education: profile.get_field(fields::EDUCATION),
            income: profile.get_field(fields::INCOME),
            interests: profile.get_field(fields::INTERESTS),
            brands: profile.get_field(fields::BRANDS),
        }
    }

    /// Labelled rows for display, in card order
    pub fn rows(&self) -> Vec<(&'static str, Option<&str>)> {
        vec![
            ("Name", self.full_name.as_deref()),
            ("Email", self.email.as_deref()),
            ("Phone", self.phone.as_deref()),
            ("Age", self.age.as_deref()),
            ("Gender", self.gender.as_deref()),
            ("City", self.city.as_deref()),
            ("State", self.state.as_deref()),
            ("Country", self.country.as_deref()),
            ("Occupation", self.occupation.as_deref()),
            ("Company", self.company.as_deref()),
            ("Education", self.education.as_deref()),
            ("Income", self.income.as_deref()),
            ("Interests", self.interests.as_deref()),
            ("Brands", self.brands.as_deref()),
        ]
    }

    pub fn known_count(&self) -> usize {
        self.rows().iter().filter(|(_, v)| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(data: Value) -> DispatchResult {
        DispatchResult::ok(Some(data), 10)
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_fenced_brand_wins_failed_hushh_skipped() {
        let mut results = HashMap::new();
        results.insert("brand".to_string(), ok(json!("```json\n{\"city\":\"Austin\"}\n```")));
        results.insert("hushh".to_string(), DispatchResult {
            success: false,
            ..Default::default()
        });

        let profile = merge_profiles(&MergePriority::default(), &results);
        assert_eq!(profile.fields.get("city"), Some(&json!("Austin")));
        assert_eq!(profile.contributors, vec!["brand".to_string()]);
        assert_eq!(profile.fields.len(), 1);
    }

    #[test]
    fn test_later_priority_wins() {
        let mut results = HashMap::new();
        results.insert("hushh".to_string(), ok(json!({"city": "Y", "email": "a@b.c"})));
        results.insert("public".to_string(), ok(json!({"city": "X"})));

        let profile = merge_profiles(&MergePriority::default(), &results);
        assert_eq!(profile.fields.get("city"), Some(&json!("X")));
        assert_eq!(profile.fields.get("email"), Some(&json!("a@b.c")));

        let reversed = MergePriority::new(["public", "hushh"]);
        let profile = merge_profiles(&reversed, &results);
        assert_eq!(profile.fields.get("city"), Some(&json!("Y")));
    }

    #[test]
    fn test_malformed_json_skipped_merge_continues() {
        let mut results = HashMap::new();
        results.insert("brand".to_string(), ok(json!("```json\n{\"city\": \n```")));
        results.insert("hushh".to_string(), ok(json!("not json at all")));
        results.insert("gemini".to_string(), ok(json!({"userProfile": {"occupation": "Chef"}})));

        let profile = merge_profiles(&MergePriority::default(), &results);
        assert_eq!(profile.contributors, vec!["gemini".to_string()]);
        assert_eq!(profile.fields.get("occupation"), Some(&json!("Chef")));
    }

    #[test]
    fn test_agents_outside_priority_ignored() {
        let mut results = HashMap::new();
        results.insert("supabase".to_string(), ok(json!({"city": "Nowhere"})));
        let profile = merge_profiles(&MergePriority::default(), &results);
        assert!(profile.is_empty());
    }

    #[test]
    fn test_user_profile_unwrapped_from_string() {
        let value = json!("{\"userProfile\": {\"name\": \"Ada\"}, \"confidence\": 0.9}");
        let map = parse_agent_value("public", &value).unwrap();
        assert_eq!(map.get("name"), Some(&json!("Ada")));
        assert!(map.get("confidence").is_none());
    }

    #[test]
    fn test_non_object_user_profile_kept_as_field() {
        let value = json!({"userProfile": "n/a", "city": "Oslo"});
        let map = parse_agent_value("public", &value).unwrap();
        assert_eq!(map.get("userProfile"), Some(&json!("n/a")));
        assert_eq!(map.get("city"), Some(&json!("Oslo")));
    }

    #[test]
    fn test_envelope_text_parsed() {
        let envelope = json!({
            "jsonrpc": "2.0",
            "id": "r1",
            "result": {"message": {"parts": [{
                "type": "text",
                "text": "```json\n{\"userProfile\":{\"city\":\"Lima\"}}\n```"
            }]}}
        });
        let map = parse_agent_value("hushh", &envelope).unwrap();
        assert_eq!(map.get("city"), Some(&json!("Lima")));

        let chat = json!({"choices": [{"message": {"content": "{\"age\": 31}"}}]});
        assert_eq!(parse_agent_value("gemini", &chat).unwrap().get("age"), Some(&json!(31)));
    }

    #[test]
    fn test_envelope_with_prose_merged_as_object() {
        let envelope = json!({"result": {"output": "I could not find that user."}});
        let map = parse_agent_value("hushh", &envelope).unwrap();
        assert_eq!(map.get("result"), Some(&json!({"output": "I could not find that user."})));
    }

    #[test]
    fn test_flat_profile_with_result_key_merged() {
        let mut results = HashMap::new();
        results.insert(
            "brand".to_string(),
            ok(json!({"name": "Ada", "city": "Austin", "result": "match found"})),
        );
        let profile = merge_profiles(&MergePriority::default(), &results);
        assert_eq!(profile.contributors, vec!["brand".to_string()]);
        assert_eq!(profile.fields.get("city"), Some(&json!("Austin")));
        assert_eq!(profile.fields.get("result"), Some(&json!("match found")));
    }

    #[test]
    fn test_fence_after_prose() {
        let raw = "Here is the profile:\n```json\n{\"city\":\"Austin\"}\n```\nLet me know!";
        assert_eq!(strip_code_fences(raw), "{\"city\":\"Austin\"}");

        let map = parse_agent_value("brand", &json!(raw)).unwrap();
        assert_eq!(map.get("city"), Some(&json!("Austin")));
    }

    #[test]
    fn test_bare_json_with_backticks_untouched() {
        let raw = r#"{"bio": "writes ```code``` daily"}"#;
        assert_eq!(strip_code_fences(raw), raw);
    }

    #[test]
    fn test_double_encoded_string() {
        let value = json!("\"{\\\"city\\\":\\\"Pune\\\"}\"");
        let map = parse_agent_value("brand", &value).unwrap();
        assert_eq!(map.get("city"), Some(&json!("Pune")));
    }

    #[test]
    fn test_array_rejected() {
        assert!(parse_agent_value("brand", &json!("[1,2]")).is_none());
        assert!(parse_agent_value("brand", &json!(42)).is_none());
    }

    #[test]
    fn test_get_field_aliases_and_paths() {
        let mut profile = ResolvedProfile::default();
        let object = json!({
            "FullName": "  ",
            "userName": "ada_l",
            "address": {"city": "London"},
            "interests": ["math", "", "engines"],
            "age": 36,
            "verified": true,
            "empty": {}
        });
        if let Value::Object(map) = object {
            profile.merge("brand", map);
        }

        assert_eq!(profile.get_field(fields::FULL_NAME), Some("ada_l".to_string()));
        assert_eq!(profile.get_field(fields::CITY), Some("London".to_string()));
        assert_eq!(profile.get_field(fields::INTERESTS), Some("math, engines".to_string()));
        assert_eq!(profile.get_field(fields::AGE), Some("36".to_string()));
        assert_eq!(profile.get_field(&["verified"]), Some("true".to_string()));
        assert_eq!(profile.get_field(&["empty"]), None);
        assert_eq!(profile.get_field(fields::COUNTRY), None);
    }

    #[test]
    fn test_summary_distinguishes_absent_from_text() {
        let mut profile = ResolvedProfile::default();
        if let Value::Object(map) = json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "occupation": "Not available"
        }) {
            profile.merge("public", map);
        }

        let summary = ProfileSummary::from_profile(&profile);
        assert_eq!(summary.full_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(summary.occupation.as_deref(), Some("Not available"));
        assert_eq!(summary.city, None);
        assert_eq!(summary.known_count(), 2);
        assert_eq!(summary.rows()[0], ("Name", Some("Grace Hopper")));
    }

    #[test]
    fn test_merge_outcomes() {
        let outcomes = vec![
            AgentOutcome {
                agent_id: "gemini".into(),
                result: ok(json!({"city": "Late"})),
            },
            AgentOutcome {
                agent_id: "brand".into(),
                result: ok(json!({"city": "Early", "age": 20})),
            },
        ];
        let profile = merge_outcomes(&MergePriority::default(), &outcomes);
        assert_eq!(profile.fields.get("city"), Some(&json!("Late")));
        assert_eq!(profile.fields.get("age"), Some(&json!(20)));
        assert_eq!(profile.contributors, vec!["brand".to_string(), "gemini".to_string()]);
    }
}
