use crate::mfa::ServiceMfaRule;
use crate::registry::DEFAULT_REGISTRY_TIMEOUT;
use crate::ticket::expiration::{
    DEFAULT_PT_NUMBER_OF_USES, DEFAULT_PT_TIME_TO_KILL_SECONDS, DEFAULT_ST_NUMBER_OF_USES,
    DEFAULT_ST_TIME_TO_KILL_SECONDS, DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
    DEFAULT_TGT_TIME_TO_IDLE_SECONDS, DEFAULT_TST_TIME_TO_KILL_SECONDS,
};
use crate::ticket::id::{DEFAULT_ENTROPY_BYTES, MIN_ENTROPY_BYTES};
use crate::ticket::{ExpirationPolicies, ExpirationPolicy};
use common::config::ObservabilityConfig;
use common::secret::SecretString;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default cleanup sweep cadence
pub const DEFAULT_CLEANER_INTERVAL_SECONDS: u64 = 120;

#[derive(Debug)]
pub struct Config {
    pub bind_address: String,
    /// Selects the Redis store; `None` keeps tickets in memory
    pub redis_url: Option<SecretString>,
    /// Suffix appended to ticket ids issued by this node
    pub node_id: Option<String>,
    pub tgt_max_time_to_live_seconds: u64,
    pub tgt_time_to_kill_seconds: u64,
    pub st_time_to_kill_seconds: u64,
    pub st_number_of_uses: u32,
    pub pgt_max_time_to_live_seconds: u64,
    pub pgt_time_to_kill_seconds: u64,
    pub pt_time_to_kill_seconds: u64,
    pub pt_number_of_uses: u32,
    pub tst_time_to_kill_seconds: u64,
    /// 0 disables the background cleaner
    pub registry_cleaner_interval_seconds: u64,
    pub registry_timeout: Duration,
    pub ticket_id_entropy_bytes: usize,
    /// username -> bcrypt hash
    pub accept_users: HashMap<String, String>,
    /// Service URL prefixes allowed to validate; empty allows all
    pub allowed_services: Vec<String>,
    pub required_mfa_services: Vec<ServiceMfaRule>,
    /// Provider id -> rank
    pub mfa_providers: BTreeMap<String, i32>,
    pub mfa_principal_attribute: Option<String>,
    /// attribute -> accepted values
    pub required_attributes: BTreeMap<String, Vec<String>>,
    pub observability: ObservabilityConfig,
    /// Grace period between readiness going false and the listener closing
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("TICKET_ID_ENTROPY_BYTES must be at least {MIN_ENTROPY_BYTES}, got {0}")]
    EntropyTooLow(usize),

    #[error("Invalid CAS_ACCEPT_USERS entry: {0}")]
    InvalidUserEntry(String),

    #[error("Invalid multifactor entry: {0}")]
    InvalidMfaRule(String),

    #[error("Invalid CAS_REQUIRED_ATTRIBUTES entry: {0}")]
    InvalidAttributeRule(String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            redis_url: None,
            node_id: None,
            tgt_max_time_to_live_seconds: DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
            tgt_time_to_kill_seconds: DEFAULT_TGT_TIME_TO_IDLE_SECONDS,
            st_time_to_kill_seconds: DEFAULT_ST_TIME_TO_KILL_SECONDS,
            st_number_of_uses: DEFAULT_ST_NUMBER_OF_USES,
            pgt_max_time_to_live_seconds: DEFAULT_TGT_MAX_TIME_TO_LIVE_SECONDS,
            pgt_time_to_kill_seconds: DEFAULT_TGT_TIME_TO_IDLE_SECONDS,
            pt_time_to_kill_seconds: DEFAULT_PT_TIME_TO_KILL_SECONDS,
            pt_number_of_uses: DEFAULT_PT_NUMBER_OF_USES,
            tst_time_to_kill_seconds: DEFAULT_TST_TIME_TO_KILL_SECONDS,
            registry_cleaner_interval_seconds: DEFAULT_CLEANER_INTERVAL_SECONDS,
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT,
            ticket_id_entropy_bytes: DEFAULT_ENTROPY_BYTES,
            accept_users: HashMap::new(),
            allowed_services: Vec::new(),
            required_mfa_services: Vec::new(),
            mfa_providers: BTreeMap::new(),
            mfa_principal_attribute: None,
            required_attributes: BTreeMap::new(),
            observability: ObservabilityConfig::default(),
            drain_seconds: 0,
        }
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(var) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

/// Split a comma list, dropping blanks
fn entries<'a>(vars: &'a HashMap<String, String>, var: &str) -> impl Iterator<Item = &'a str> {
    vars.get(var)
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or(defaults.bind_address);

        let redis_url = vars
            .get("REDIS_URL")
            .filter(|url| !url.is_empty())
            .map(|url| SecretString::from(url.as_str()));

        let node_id = vars.get("CAS_NODE_ID").cloned().filter(|n| !n.is_empty());

        let ticket_id_entropy_bytes =
            parse_var(vars, "TICKET_ID_ENTROPY_BYTES", defaults.ticket_id_entropy_bytes)?;
        if ticket_id_entropy_bytes < MIN_ENTROPY_BYTES {
            return Err(ConfigError::EntropyTooLow(ticket_id_entropy_bytes));
        }

        let accept_users = entries(vars, "CAS_ACCEPT_USERS")
            .map(|entry| {
                // bcrypt hashes contain '$' but never ':'
                match entry.split_once(':') {
                    Some((user, hash)) if !user.is_empty() && !hash.is_empty() => {
                        Ok((user.to_string(), hash.to_string()))
                    }
                    _ => Err(ConfigError::InvalidUserEntry(
                        user_of(entry).to_string(),
                    )),
                }
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        let allowed_services = entries(vars, "CAS_ALLOWED_SERVICES")
            .map(str::to_string)
            .collect();

        let mut mfa_providers = BTreeMap::new();
        let mut required_mfa_services = Vec::new();
        for entry in entries(vars, "CAS_REQUIRED_MFA_SERVICES") {
            let (prefix, provider) = entry
                .split_once('=')
                .filter(|(p, v)| !p.is_empty() && !v.is_empty())
                .ok_or_else(|| ConfigError::InvalidMfaRule(entry.to_string()))?;
            let (provider_id, order) = provider_rank(provider, entry)?;
            mfa_providers.insert(provider_id.to_string(), order);
            required_mfa_services.push(ServiceMfaRule {
                service_prefix: prefix.to_string(),
                provider_id: provider_id.to_string(),
            });
        }

        for entry in entries(vars, "CAS_MFA_PROVIDERS") {
            let (provider_id, order) = provider_rank(entry, entry)?;
            mfa_providers.insert(provider_id.to_string(), order);
        }

        let mut required_attributes = BTreeMap::new();
        for entry in entries(vars, "CAS_REQUIRED_ATTRIBUTES") {
            let (name, values) = match entry.split_once('=') {
                Some((name, values)) => (name, values),
                None => (entry, ""),
            };
            if name.is_empty() {
                return Err(ConfigError::InvalidAttributeRule(entry.to_string()));
            }
            let accepted: Vec<String> = values
                .split('|')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            required_attributes.insert(name.to_string(), accepted);
        }

        let json_logs = vars
            .get("CAS_JSON_LOGS")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"));

        Ok(Config {
            bind_address,
            redis_url,
            node_id,
            tgt_max_time_to_live_seconds: parse_var(
                vars,
                "TGT_MAX_TIME_TO_LIVE_SECONDS",
                defaults.tgt_max_time_to_live_seconds,
            )?,
            tgt_time_to_kill_seconds: parse_var(
                vars,
                "TGT_TIME_TO_KILL_SECONDS",
                defaults.tgt_time_to_kill_seconds,
            )?,
            st_time_to_kill_seconds: parse_var(
                vars,
                "ST_TIME_TO_KILL_SECONDS",
                defaults.st_time_to_kill_seconds,
            )?,
            st_number_of_uses: parse_var(vars, "ST_NUMBER_OF_USES", defaults.st_number_of_uses)?,
            pgt_max_time_to_live_seconds: parse_var(
                vars,
                "PGT_MAX_TIME_TO_LIVE_SECONDS",
                defaults.pgt_max_time_to_live_seconds,
            )?,
            pgt_time_to_kill_seconds: parse_var(
                vars,
                "PGT_TIME_TO_KILL_SECONDS",
                defaults.pgt_time_to_kill_seconds,
            )?,
            pt_time_to_kill_seconds: parse_var(
                vars,
                "PT_TIME_TO_KILL_SECONDS",
                defaults.pt_time_to_kill_seconds,
            )?,
            pt_number_of_uses: parse_var(vars, "PT_NUMBER_OF_USES", defaults.pt_number_of_uses)?,
            tst_time_to_kill_seconds: parse_var(
                vars,
                "TST_TIME_TO_KILL_SECONDS",
                defaults.tst_time_to_kill_seconds,
            )?,
            registry_cleaner_interval_seconds: parse_var(
                vars,
                "REGISTRY_CLEANER_INTERVAL_SECONDS",
                defaults.registry_cleaner_interval_seconds,
            )?,
            registry_timeout: Duration::from_millis(parse_var(
                vars,
                "REGISTRY_TIMEOUT_MILLIS",
                defaults.registry_timeout.as_millis() as u64,
            )?),
            ticket_id_entropy_bytes,
            accept_users,
            allowed_services,
            required_mfa_services,
            mfa_providers,
            mfa_principal_attribute: vars
                .get("CAS_MFA_PRINCIPAL_ATTRIBUTE")
                .cloned()
                .filter(|a| !a.is_empty()),
            required_attributes,
            observability: ObservabilityConfig {
                json_logs,
                ..defaults.observability
            },
            drain_seconds: parse_var(vars, "CAS_DRAIN_SECONDS", defaults.drain_seconds)?,
        })
    }

    /// Per-type expiration policies
    pub fn expiration_policies(&self) -> ExpirationPolicies {
        ExpirationPolicies {
            ticket_granting: ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds: self.tgt_max_time_to_live_seconds,
                time_to_idle_seconds: self.tgt_time_to_kill_seconds,
            },
            service: ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds: self.st_time_to_kill_seconds,
                number_of_uses: self.st_number_of_uses,
            },
            proxy_granting: ExpirationPolicy::TicketGranting {
                max_time_to_live_seconds: self.pgt_max_time_to_live_seconds,
                time_to_idle_seconds: self.pgt_time_to_kill_seconds,
            },
            proxy: ExpirationPolicy::MultiTimeUseOrTimeout {
                time_to_kill_seconds: self.pt_time_to_kill_seconds,
                number_of_uses: self.pt_number_of_uses,
            },
            transient_session: ExpirationPolicy::HardTimeout {
                time_to_kill_seconds: self.tst_time_to_kill_seconds,
            },
        }
    }
}

/// Parse `id[:rank]`; rank defaults to 0
fn provider_rank<'a>(provider: &'a str, entry: &str) -> Result<(&'a str, i32), ConfigError> {
    match provider.split_once(':') {
        Some((id, rank)) if !id.is_empty() => rank
            .parse()
            .map(|rank| (id, rank))
            .map_err(|_| ConfigError::InvalidMfaRule(entry.to_string())),
        Some(_) => Err(ConfigError::InvalidMfaRule(entry.to_string())),
        None => Ok((provider, 0)),
    }
}

/// Username part of a malformed user entry, never the hash
fn user_of(entry: &str) -> &str {
    entry.split(':').next().unwrap_or_default()
}
