//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (RPC URL, operator key) are referenced by env-var name in the
//! config and resolved at runtime, after `.env` has been loaded.
//!
//! Amounts a human edits are in ETH; amounts the contract compares against
//! directly (the bid increment) are in wei.

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::executor::ExecutorConfig;
use crate::engine::scheduler::{ShutdownPolicy, WorkerConfig};
use crate::engine::upkeep::WithdrawalConfig;
use crate::strategy::DecisionParams;
use crate::types::{AuctionRules, PoolId, PoolKey, Wei};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub upkeep: UpkeepConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub poll_interval_secs: u64,
    /// Log would-be transactions instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_max_estimate_age")]
    pub max_estimate_age_secs: i64,
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_rpc_url_env")]
    pub rpc_url_env: String,
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    pub hook_address: String,
    /// Read auction constants from the hook at startup.
    #[serde(default = "default_true")]
    pub discover_rules: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    pub bid_fraction: f64,
    pub min_profit_threshold_eth: f64,
    pub min_bid_increment_wei: u64,
    pub min_deposit_blocks: u64,
    pub activation_delay_blocks: u64,
    pub fee_volatility_multiplier: f64,
    pub fee_update_threshold: u32,
    pub min_fee: u32,
    pub max_fee: u32,
    pub base_fee: u32,
    /// Upper bound on the deposit sent with a single bid.
    #[serde(default)]
    pub max_deposit_eth: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            bid_fraction: 0.8,
            min_profit_threshold_eth: 0.001,
            min_bid_increment_wei: 100,
            min_deposit_blocks: 100,
            activation_delay_blocks: 5,
            fee_volatility_multiplier: 10_000.0,
            fee_update_threshold: 100,
            min_fee: 500,
            max_fee: 10_000,
            base_fee: 3000,
            max_deposit_eth: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimatorConfig {
    pub kind: String,
    pub profit_per_block_eth: f64,
    pub volatility: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            kind: "static".to_string(),
            profit_per_block_eth: 0.002,
            volatility: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    /// 32-byte pool id, hex.
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    pub currency0: String,
    pub currency1: String,
    #[serde(default = "default_pool_fee")]
    pub fee: u32,
    #[serde(default = "default_tick_spacing")]
    pub tick_spacing: i32,
}

/// Fee withdrawal and wallet health checks, run beside the pool workers.
#[derive(Debug, Deserialize, Clone)]
pub struct UpkeepConfig {
    pub withdraw_fees: bool,
    pub fee_check_interval_secs: u64,
    pub withdrawal_gas_estimate: u64,
    /// Withdraw once accrued fees reach this multiple of the gas cost.
    pub withdrawal_gas_multiple: f64,
    pub health_check_interval_secs: u64,
    pub low_balance_eth: f64,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            withdraw_fees: true,
            fee_check_interval_secs: 60,
            withdrawal_gas_estimate: 100_000,
            withdrawal_gas_multiple: 2.0,
            health_check_interval_secs: 60,
            low_balance_eth: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_max_estimate_age() -> i64 {
    60
}

fn default_rpc_url_env() -> String {
    "RPC_URL".to_string()
}

fn default_private_key_env() -> String {
    "OPERATOR_PRIVATE_KEY".to_string()
}

fn default_true() -> bool {
    true
}

fn default_pool_fee() -> u32 {
    3000
}

fn default_tick_spacing() -> i32 {
    60
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

const WEI_PER_ETH: Decimal = dec!(1_000_000_000_000_000_000);

/// Exact decimal for a config float (`0.8` stays `0.8`).
fn decimal_from_f64(value: f64, field: &str) -> Result<Decimal> {
    if !value.is_finite() {
        bail!("{field} must be a finite number");
    }
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .with_context(|| format!("{field} = {value} is out of range"))
}

/// ETH amount from config → whole wei.
pub fn eth_to_wei(eth: f64, field: &str) -> Result<Wei> {
    let eth = decimal_from_f64(eth, field)?;
    eth.checked_mul(WEI_PER_ETH)
        .map(|w| w.trunc())
        .with_context(|| format!("{field} = {eth} ETH is out of range"))
}

fn parse_address(raw: &str, field: &str) -> Result<Address> {
    Address::from_str(raw.trim()).with_context(|| format!("{field} is not a valid address: {raw}"))
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the operator could not run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.poll_interval_secs == 0 {
            bail!("agent.poll_interval_secs must be greater than zero");
        }
        if self.agent.confirmation_timeout_secs == 0 {
            bail!("agent.confirmation_timeout_secs must be greater than zero");
        }

        let s = &self.strategy;
        if !(s.bid_fraction > 0.0 && s.bid_fraction <= 1.0) {
            bail!("strategy.bid_fraction must be in (0, 1], got {}", s.bid_fraction);
        }
        if s.min_profit_threshold_eth < 0.0 {
            bail!("strategy.min_profit_threshold_eth must not be negative");
        }
        if s.min_fee > s.max_fee {
            bail!("strategy.min_fee ({}) exceeds strategy.max_fee ({})", s.min_fee, s.max_fee);
        }
        if s.base_fee < s.min_fee || s.base_fee > s.max_fee {
            bail!(
                "strategy.base_fee ({}) must lie within [{}, {}]",
                s.base_fee,
                s.min_fee,
                s.max_fee
            );
        }
        if s.min_deposit_blocks == 0 {
            bail!("strategy.min_deposit_blocks must be greater than zero");
        }
        if let Some(cap) = s.max_deposit_eth {
            eth_to_wei(cap, "strategy.max_deposit_eth")?;
        }
        eth_to_wei(s.min_profit_threshold_eth, "strategy.min_profit_threshold_eth")?;
        decimal_from_f64(s.fee_volatility_multiplier, "strategy.fee_volatility_multiplier")?;

        let u = &self.upkeep;
        if u.fee_check_interval_secs == 0 || u.health_check_interval_secs == 0 {
            bail!("upkeep intervals must be greater than zero");
        }
        if u.withdrawal_gas_multiple < 0.0 {
            bail!("upkeep.withdrawal_gas_multiple must not be negative");
        }
        decimal_from_f64(u.withdrawal_gas_multiple, "upkeep.withdrawal_gas_multiple")?;
        eth_to_wei(u.low_balance_eth, "upkeep.low_balance_eth")?;

        if self.estimator.kind != "static" {
            bail!("estimator.kind '{}' is not supported (expected 'static')", self.estimator.kind);
        }
        eth_to_wei(self.estimator.profit_per_block_eth, "estimator.profit_per_block_eth")?;
        decimal_from_f64(self.estimator.volatility, "estimator.volatility")?;

        parse_address(&self.chain.hook_address, "chain.hook_address")?;

        if self.pools.is_empty() {
            bail!("At least one [[pools]] entry is required");
        }
        for pool in &self.pools {
            pool.pool_id()?;
            self.pool_key(pool)?;
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The operator's private key, read from `chain.private_key_env`.
    pub fn private_key(&self) -> Result<SecretString> {
        Self::resolve_env(&self.chain.private_key_env).map(SecretString::new)
    }

    pub fn rpc_url(&self) -> Result<String> {
        Self::resolve_env(&self.chain.rpc_url_env)
    }

    pub fn hook_address(&self) -> Result<Address> {
        parse_address(&self.chain.hook_address, "chain.hook_address")
    }

    pub fn pool_key(&self, pool: &PoolConfig) -> Result<PoolKey> {
        Ok(PoolKey {
            currency0: parse_address(&pool.currency0, "pools.currency0")?,
            currency1: parse_address(&pool.currency1, "pools.currency1")?,
            fee: pool.fee,
            tick_spacing: pool.tick_spacing,
            hooks: self.hook_address()?,
        })
    }

    /// Auction rules as configured, before any on-chain discovery.
    pub fn auction_rules(&self) -> Result<AuctionRules> {
        let s = &self.strategy;
        Ok(AuctionRules {
            min_bid_increment: Decimal::from(s.min_bid_increment_wei),
            min_deposit_blocks: s.min_deposit_blocks,
            activation_delay: s.activation_delay_blocks,
            min_fee: s.min_fee,
            max_fee: s.max_fee,
        })
    }

    /// Decision parameters for `operator` under `rules`.
    pub fn decision_params(&self, rules: &AuctionRules, operator: Address) -> Result<DecisionParams> {
        let s = &self.strategy;
        Ok(DecisionParams {
            operator,
            bid_fraction: decimal_from_f64(s.bid_fraction, "strategy.bid_fraction")?,
            min_profit_threshold: eth_to_wei(s.min_profit_threshold_eth, "strategy.min_profit_threshold_eth")?,
            fee_volatility_multiplier: decimal_from_f64(
                s.fee_volatility_multiplier,
                "strategy.fee_volatility_multiplier",
            )?,
            fee_update_threshold: s.fee_update_threshold,
            min_bid_increment: rules.min_bid_increment,
            max_fee: rules.max_fee,
            min_fee: rules.min_fee,
            base_fee: s.base_fee,
        })
    }

    pub fn executor_config(&self) -> Result<ExecutorConfig> {
        let max_deposit = self
            .strategy
            .max_deposit_eth
            .map(|eth| eth_to_wei(eth, "strategy.max_deposit_eth"))
            .transpose()?;
        Ok(ExecutorConfig {
            dry_run: self.agent.dry_run,
            confirmation_timeout: Duration::from_secs(self.agent.confirmation_timeout_secs),
            max_deposit,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_secs(self.agent.poll_interval_secs),
            max_estimate_age_secs: self.agent.max_estimate_age_secs,
            shutdown_policy: self.agent.shutdown_policy,
        }
    }

    pub fn withdrawal_config(&self) -> Result<WithdrawalConfig> {
        let u = &self.upkeep;
        Ok(WithdrawalConfig {
            interval: Duration::from_secs(u.fee_check_interval_secs),
            estimated_gas: u.withdrawal_gas_estimate,
            gas_cost_multiple: decimal_from_f64(u.withdrawal_gas_multiple, "upkeep.withdrawal_gas_multiple")?,
            dry_run: self.agent.dry_run,
            confirmation_timeout: Duration::from_secs(self.agent.confirmation_timeout_secs),
        })
    }

    /// Interval and low-balance threshold (wei) for the wallet health check.
    pub fn health_check(&self) -> Result<(Duration, Wei)> {
        Ok((
            Duration::from_secs(self.upkeep.health_check_interval_secs),
            eth_to_wei(self.upkeep.low_balance_eth, "upkeep.low_balance_eth")?,
        ))
    }

    /// Static estimator parameters as (profit per block in wei, volatility).
    pub fn static_estimate(&self) -> Result<(Wei, Decimal)> {
        Ok((
            eth_to_wei(self.estimator.profit_per_block_eth, "estimator.profit_per_block_eth")?,
            decimal_from_f64(self.estimator.volatility, "estimator.volatility")?,
        ))
    }
}

impl PoolConfig {
    pub fn pool_id(&self) -> Result<PoolId> {
        PoolId::from_str(&self.id).with_context(|| format!("pools.id is not a 32-byte hex id: {}", self.id))
    }

    /// Label for logs: the configured label, or the abbreviated id.
    pub fn display_name(&self) -> String {
        match (&self.label, self.pool_id()) {
            (Some(label), _) => label.clone(),
            (None, Ok(id)) => id.short(),
            (None, Err(_)) => self.id.clone(),
        }
    }
}
