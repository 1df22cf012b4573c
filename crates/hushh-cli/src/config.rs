use anyhow::{Context, Result};
use hushh_a2a::{AnalysisPlan, Route};
use hushh_core::{AgentDescriptor, AgentRegistry, MergePriority};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HushhConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Direct,
    Proxy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub mode: DispatchMode,
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Direct,
            proxy_url: default_proxy_url(),
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_step_delay_ms() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_agents")]
    pub agents: Vec<String>,
    #[serde(default)]
    pub merge_priority: MergePriority,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            agents: default_analysis_agents(),
            merge_priority: MergePriority::default(),
        }
    }
}

fn default_analysis_agents() -> Vec<String> {
    MergePriority::default().0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub user_details_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
            user_details_url: None,
        }
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_whatsapp_language")]
    pub default_language: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            default_language: default_whatsapp_language(),
        }
    }
}

fn default_whatsapp_language() -> String {
    "en_US".to_string()
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hushh")
}

/// Unset placeholders expand to "" or stay as `${VAR}`
fn is_unset(value: &str) -> bool {
    value.trim().is_empty() || value.contains("${")
}

impl HushhConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Agent tokens may live in this file
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `hushh init` first.",
                path.display()
            )
        })?;

        Self::parse(&content, |name| std::env::var(name).ok())
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse TOML after expanding allowlisted `${VAR}`s through `lookup`
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if content
            .lines()
            .map(str::trim)
            .any(|line| line.starts_with("auth_token") && !line.contains("${"))
        {
            warn!(
                "Agent auth_token is hardcoded in config file. For security, use environment \
                 variables: auth_token = \"${{HUSHH_AGENT_TOKEN}}\""
            );
        }

        let expanded = expand_env_vars(content, lookup);
        let mut config: Self = toml::from_str(&expanded)?;

        for agent in &mut config.agents {
            if agent.auth_token.as_deref().is_some_and(is_unset) {
                agent.auth_token = None;
            }
        }
        if config.gateway.user_details_url.as_deref().is_some_and(is_unset) {
            config.gateway.user_details_url = None;
        }

        Ok(config)
    }

    /// Registry of every agent with a usable base URL
    pub fn registry(&self) -> Result<AgentRegistry> {
        let agents = self
            .agents
            .iter()
            .filter(|agent| {
                if is_unset(&agent.base_url) {
                    warn!("Agent '{}' has no base_url configured, skipping", agent.id);
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();
        AgentRegistry::new(agents).context("Invalid agent configuration")
    }

    pub fn route(&self) -> Route {
        match self.dispatch.mode {
            DispatchMode::Direct => Route::Direct,
            DispatchMode::Proxy => Route::Proxy {
                base_url: self.dispatch.proxy_url.clone(),
            },
        }
    }

    pub fn analysis_plan(&self) -> AnalysisPlan {
        AnalysisPlan {
            agents: self.analysis.agents.clone(),
            step_delay: Duration::from_millis(self.dispatch.step_delay_ms),
            priority: self.analysis.merge_priority.clone(),
        }
    }

    pub fn gateway_addr(&self, port_override: Option<u16>) -> Result<SocketAddr> {
        let port = port_override.unwrap_or(self.gateway.port);
        format!("{}:{}", self.gateway.bind, port)
            .parse()
            .with_context(|| format!("Invalid gateway bind address '{}'", self.gateway.bind))
    }

    /// Copy safe to print: tokens masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for agent in &mut copy.agents {
            if let Some(token) = agent.auth_token.as_mut() {
                *token = mask_secret(token);
            }
        }
        copy
    }
}

/// Mask a secret string for safe display.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "HUSHH_BRAND_AGENT_URL",
    "HUSHH_CRM_AGENT_URL",
    "HUSHH_SUPABASE_AGENT_URL",
    "HUSHH_PUBLIC_AGENT_URL",
    "HUSHH_GEMINI_AGENT_URL",
    "HUSHH_WHATSAPP_URL",
    "HUSHH_EMAIL_URL",
    "HUSHH_USER_DETAILS_URL",
    "HUSHH_AGENT_TOKEN",
    "WHATSAPP_ACCESS_TOKEN",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        if ALLOWED_ENV_VARS.contains(&var_name) {
            result.push_str(&lookup(var_name).unwrap_or_default());
        } else {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            result.push_str(&rest[start..start + len + 1]);
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use hushh_core::AgentKind;

    const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

    fn full_env(name: &str) -> Option<String> {
        match name {
            "HUSHH_AGENT_TOKEN" => Some("crm-secret-token".to_string()),
            "WHATSAPP_ACCESS_TOKEN" | "HUSHH_USER_DETAILS_URL" => None,
            other => Some(format!(
                "https://{}.agents.test/",
                other.to_lowercase().replace('_', "-")
            )),
        }
    }

    #[test]
    fn test_default_config_with_env() {
        let config = HushhConfig::parse(DEFAULT_CONFIG, full_env).unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.get("whatsapp").unwrap().kind, AgentKind::WhatsappTemplate);
        assert_eq!(
            registry.get("hushh").unwrap().auth_token.as_deref(),
            Some("crm-secret-token")
        );
        assert_eq!(registry.get("whatsapp").unwrap().auth_token, None);
        assert_eq!(config.gateway.user_details_url, None);
        assert_eq!(config.route(), Route::Direct);

        let plan = config.analysis_plan();
        assert_eq!(plan.agents, vec!["brand", "hushh", "public", "gemini"]);
        assert_eq!(plan.step_delay, Duration::from_millis(600));
        assert_eq!(plan.priority, MergePriority::default());
    }

    #[test]
    fn test_default_config_without_env_skips_agents() {
        let config = HushhConfig::parse(DEFAULT_CONFIG, |_| None).unwrap();
        assert_eq!(config.agents.len(), 7);
        assert!(config.registry().unwrap().is_empty());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = HushhConfig::parse(
            r#"
[dispatch]
mode = "proxy"

[analysis]
merge_priority = ["gemini", "brand"]
"#,
            |_| None,
        )
        .unwrap();
        assert_eq!(
            config.route(),
            Route::Proxy { base_url: "http://127.0.0.1:3000".to_string() }
        );
        assert_eq!(config.analysis.agents, vec!["brand", "hushh", "public", "gemini"]);
        assert_eq!(config.analysis.merge_priority, MergePriority::new(["gemini", "brand"]));
        assert_eq!(config.whatsapp.default_language, "en_US");
        assert_eq!(
            config.gateway_addr(Some(8080)).unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_invalid_agent_url_is_error() {
        let config = HushhConfig::parse(
            r#"
[[agents]]
id = "x"
kind = "email"
base_url = "mailto:someone@example.com"
"#,
            |_| None,
        )
        .unwrap();
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_expand_env_vars_allowlist() {
        let lookup = |name: &str| Some(format!("<{}>", name));
        assert_eq!(
            expand_env_vars("a=${HUSHH_AGENT_TOKEN} b=${SECRET} c", lookup),
            "a=<HUSHH_AGENT_TOKEN> b=${SECRET} c"
        );
        assert_eq!(expand_env_vars("open ${HOME", lookup), "open ${HOME");
        assert_eq!(expand_env_vars("none", lookup), "none");
    }

    #[test]
    fn test_redacted_masks_tokens() {
        let config = HushhConfig::parse(DEFAULT_CONFIG, full_env).unwrap();
        let printed = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!printed.contains("crm-secret-token"));
        assert!(printed.contains("crm...oken"));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("abcdefghij"), "abc...ghij");
    }

    #[cfg(unix)]
    #[test]
    fn test_load_checks_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dispatch]\nstep_delay_ms = 5\n").unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = HushhConfig::load(&Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains("overly permissive"));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let config = HushhConfig::load(&Some(path)).unwrap();
        assert_eq!(config.dispatch.step_delay_ms, 5);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = HushhConfig::load(&Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("hushh init"));
    }
}
