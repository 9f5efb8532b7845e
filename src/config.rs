//! Configuration
//!
//! Chain definitions load from TOML, with per-chain environment overrides
//! for enable flags, RPC endpoints, and profit thresholds. Everything is
//! validated at startup; a misconfigured chain refuses to start rather
//! than run with guesses.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use crate::types::{DexDescriptor, Token};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Trading thresholds per chain.
#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Minimum cycle profit as a percentage (0.3 = 0.3%).
    pub min_profit_percent: f64,
    /// Minimum net profit in USD for an opportunity to be emitted.
    pub min_profit_usd: f64,
    pub min_trade_usd: f64,
    pub max_trade_usd: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_profit_percent: 0.3,
            min_profit_usd: 1.0,
            min_trade_usd: 100.0,
            max_trade_usd: 10_000.0,
        }
    }
}

/// Gas parameters per chain.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// Base gas units for an arbitrage transaction.
    pub base_units: u64,
    /// Additional units per swap hop.
    pub units_per_hop: u64,
    /// Effective gas price in gwei used when no live estimate exists.
    pub gas_price_gwei: f64,
    /// True for rollup-style chains with an extra L1 data fee component.
    #[serde(default)]
    pub has_l1_data_fee: bool,
    /// Fallback L1 fee in wei per calldata byte when the chain collaborator
    /// supplies no estimator.
    #[serde(default)]
    pub l1_fee_per_byte_wei: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            base_units: 150_000,
            units_per_hop: 110_000,
            gas_price_gwei: 30.0,
            has_l1_data_fee: false,
            l1_fee_per_byte_wei: 0,
        }
    }
}

/// Flash-loan provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FlashLoanConfig {
    /// Provider label (aave-v3, balancer-vault, ...). None when the chain
    /// has no flash-loan contract configured.
    #[serde(default)]
    pub provider: Option<String>,
    /// Fee as a fraction of the borrowed amount. Balancer-vault style
    /// providers configure 0.0.
    #[serde(default = "default_flash_fee")]
    pub fee: f64,
}

fn default_flash_fee() -> f64 {
    0.0025
}

impl Default for FlashLoanConfig {
    fn default() -> Self {
        Self {
            provider: None,
            fee: default_flash_fee(),
        }
    }
}

impl FlashLoanConfig {
    /// Fee actually subtracted by the optimizer: zero when no provider is
    /// configured, and the opportunity is marked flash_loan_available=false.
    pub fn effective_fee(&self) -> f64 {
        if self.provider.is_some() {
            self.fee
        } else {
            0.0
        }
    }

    pub fn available(&self) -> bool {
        self.provider.is_some()
    }
}

/// One tracked pool. Pool discovery via factory enumeration lives with
/// the chain collaborator; the core polls the pools it is told about.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub address: alloy::primitives::Address,
    /// DEX name; must match an entry in `dexes`.
    pub dex: String,
    /// Symbol of the pool's on-chain token0; must exist in `tokens`.
    pub token0: String,
    pub token1: String,
}

/// One liquid-staking derivative tracked on a chain.
#[derive(Debug, Clone, Deserialize)]
pub struct LsdConfig {
    /// Derivative token symbol (must exist in the token table).
    pub symbol: String,
    /// Underlying token symbol (must exist in the token table).
    pub underlying: String,
    /// Contract exposing the protocol exchange rate view.
    pub rate_contract: alloy::primitives::Address,
    /// Which view to call: "steth-per-token" or "price-per-share".
    pub rate_kind: String,
    /// Minutes after the daily oracle report treated as the rebase window.
    #[serde(default = "default_rebase_window_min")]
    pub rebase_window_minutes: u64,
    /// Hour (UTC) of the daily oracle report, when known.
    #[serde(default)]
    pub report_hour_utc: Option<u8>,
}

fn default_rebase_window_min() -> u64 {
    30
}

/// Detector knobs shared by every chain, overridable per chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Liquidity floor for the two-DEX detector, USD.
    pub cross_dex_min_liquidity_usd: f64,
    /// Liquidity floor for triangular cycles, USD.
    pub triangular_min_liquidity_usd: f64,
    /// Liquidity floor for 4-5 hop cycles, USD.
    pub multi_hop_min_liquidity_usd: f64,
    /// Liquidity floor for stablecoin detectors, USD.
    pub stable_min_liquidity_usd: f64,
    /// Longest cycle the multi-hop search enumerates.
    pub max_hops: usize,
    /// Hard cap on cycles visited per multi-hop invocation.
    pub max_cycles_per_pass: usize,
    /// Minimum V2/V3 spread as a fraction (0.0015 = 0.15%).
    pub v2_v3_min_spread: f64,
    /// Stable depeg threshold epsilon (0.002 = 0.2%).
    pub depeg_epsilon: f64,
    /// Severe depeg threshold (0.01 = 1%).
    pub severe_depeg_epsilon: f64,
    /// Stable-to-stable spread threshold (0.003 = 0.3%).
    pub stable_spread_min: f64,
    /// Block window pairing a V3 Burn with a prior Mint for JIT detection.
    pub jit_block_window: u64,
    /// Removed-liquidity share of added liquidity that qualifies as JIT.
    pub jit_removal_ratio: f64,
    /// Profit discount applied to estimated (range-crossing) V3 quotes.
    pub estimated_quote_discount: f64,
    /// USD notional above which a V2/V3 swap counts as a large swap.
    pub large_swap_usd: f64,
    /// Snapshots older than this many blocks are unusable for detection.
    pub staleness_blocks: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            cross_dex_min_liquidity_usd: 5_000.0,
            triangular_min_liquidity_usd: 2_000.0,
            multi_hop_min_liquidity_usd: 500.0,
            stable_min_liquidity_usd: 25_000.0,
            max_hops: 5,
            max_cycles_per_pass: 1_000,
            v2_v3_min_spread: 0.0015,
            depeg_epsilon: 0.002,
            severe_depeg_epsilon: 0.01,
            stable_spread_min: 0.003,
            jit_block_window: 2,
            jit_removal_ratio: 0.8,
            estimated_quote_discount: 0.25,
            large_swap_usd: 1_000.0,
            staleness_blocks: 2,
        }
    }
}

/// Full definition of one chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Short name used in logs and env override keys ("polygon", "base").
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub block_time_ms: u64,
    /// Wrapped native token; must also appear in `tokens`.
    pub native_token: String,
    pub rpc_endpoints: Vec<String>,
    /// Global token-bucket rate limit, requests per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rpm: u32,
    pub dexes: Vec<DexDescriptor>,
    pub tokens: Vec<Token>,
    /// Pools the poller tracks.
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    /// Cycle start/end candidates; must exist in `tokens`.
    pub base_tokens: Vec<String>,
    /// Stablecoin symbols; must exist in `tokens`.
    pub stable_tokens: Vec<String>,
    #[serde(default)]
    pub lsds: Vec<LsdConfig>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub flash_loan: FlashLoanConfig,
    #[serde(default)]
    pub detectors: DetectorSettings,
}

fn default_true() -> bool {
    true
}

fn default_rate_limit() -> u32 {
    300
}

impl ChainConfig {
    pub fn token(&self, symbol: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn block_time_secs(&self) -> f64 {
        self.block_time_ms as f64 / 1000.0
    }

    /// Startup validation. Anything wrong here is fatal for the chain's
    /// worker; there is no degraded mode for a broken config.
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            bail!("{}: chain_id must be nonzero", self.name);
        }
        if self.block_time_ms == 0 {
            bail!("{}: block_time_ms must be nonzero", self.name);
        }
        if self.rpc_endpoints.is_empty() && self.enabled {
            bail!("{}: enabled chain needs at least one RPC endpoint", self.name);
        }

        let mut symbols = HashSet::new();
        for token in &self.tokens {
            if token.decimals > 18 {
                bail!(
                    "{}: token {} has decimals {} outside [0, 18]",
                    self.name,
                    token.symbol,
                    token.decimals
                );
            }
            if token.address.is_zero() {
                bail!("{}: token {} has a zero address", self.name, token.symbol);
            }
            if !symbols.insert(token.symbol.clone()) {
                bail!("{}: duplicate token symbol {}", self.name, token.symbol);
            }
        }

        for dex in &self.dexes {
            if !(0.0..=0.1).contains(&dex.fee) {
                bail!(
                    "{}: dex {} fee {} outside [0, 0.1]",
                    self.name,
                    dex.name,
                    dex.fee
                );
            }
        }

        for base in &self.base_tokens {
            if !symbols.contains(base) {
                bail!("{}: base token {} missing from token table", self.name, base);
            }
        }
        for stable in &self.stable_tokens {
            if !symbols.contains(stable) {
                bail!(
                    "{}: stable token {} missing from token table",
                    self.name,
                    stable
                );
            }
        }
        if !symbols.contains(&self.native_token) {
            bail!(
                "{}: native token {} missing from token table",
                self.name,
                self.native_token
            );
        }
        for pool in &self.pools {
            if pool.address.is_zero() {
                bail!("{}: pool for {}/{} has a zero address", self.name, pool.token0, pool.token1);
            }
            if !self.dexes.iter().any(|d| d.name == pool.dex) {
                bail!("{}: pool {} references unknown dex {}", self.name, pool.address, pool.dex);
            }
            if !symbols.contains(&pool.token0) || !symbols.contains(&pool.token1) {
                bail!(
                    "{}: pool {} tokens {}/{} missing from token table",
                    self.name,
                    pool.address,
                    pool.token0,
                    pool.token1
                );
            }
        }
        for lsd in &self.lsds {
            if !symbols.contains(&lsd.symbol) || !symbols.contains(&lsd.underlying) {
                bail!(
                    "{}: LSD {}/{} tokens missing from token table",
                    self.name,
                    lsd.symbol,
                    lsd.underlying
                );
            }
            if lsd.rate_kind != "steth-per-token" && lsd.rate_kind != "price-per-share" {
                bail!("{}: LSD {} has unknown rate_kind {}", self.name, lsd.symbol, lsd.rate_kind);
            }
        }

        if self.thresholds.max_trade_usd < self.thresholds.min_trade_usd {
            bail!(
                "{}: max_trade_usd {} below min_trade_usd {}",
                self.name,
                self.thresholds.max_trade_usd,
                self.thresholds.min_trade_usd
            );
        }
        if !(0.0..=0.1).contains(&self.flash_loan.fee) {
            bail!("{}: flash loan fee {} outside [0, 0.1]", self.name, self.flash_loan.fee);
        }
        Ok(())
    }

    /// Apply `ARBSCAN_<NAME>_*` environment overrides: ENABLED,
    /// MIN_PROFIT_USD, MIN_PROFIT_PERCENT, RPC_URLS (comma separated),
    /// RATE_LIMIT_RPM.
    pub fn apply_env_overrides(&mut self) {
        let prefix = format!("ARBSCAN_{}_", self.name.to_uppercase());
        if let Ok(v) = std::env::var(format!("{}ENABLED", prefix)) {
            if let Ok(flag) = v.parse::<bool>() {
                self.enabled = flag;
            }
        }
        if let Ok(v) = std::env::var(format!("{}MIN_PROFIT_USD", prefix)) {
            if let Ok(x) = v.parse::<f64>() {
                self.thresholds.min_profit_usd = x;
            }
        }
        if let Ok(v) = std::env::var(format!("{}MIN_PROFIT_PERCENT", prefix)) {
            if let Ok(x) = v.parse::<f64>() {
                self.thresholds.min_profit_percent = x;
            }
        }
        if let Ok(v) = std::env::var(format!("{}RPC_URLS", prefix)) {
            let urls: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !urls.is_empty() {
                self.rpc_endpoints = urls;
            }
        }
        if let Ok(v) = std::env::var(format!("{}RATE_LIMIT_RPM", prefix)) {
            if let Ok(x) = v.parse::<u32>() {
                self.rate_limit_rpm = x;
            }
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub chains: Vec<ChainConfig>,
    /// Seconds between coordinator worker launches.
    #[serde(default = "default_stagger")]
    pub launch_stagger_secs: f64,
    /// Optional JSONL file the sink appends emitted opportunities to.
    #[serde(default)]
    pub sink_path: Option<String>,
    /// Assumed cost of bridging between chains, as a fraction, netted out
    /// of cross-chain price gaps before they count as opportunities.
    #[serde(default = "default_bridge_cost")]
    pub bridge_cost_fraction: f64,
}

fn default_stagger() -> f64 {
    1.0
}

fn default_bridge_cost() -> f64 {
    0.003
}

impl AppConfig {
    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.enabled)
    }
}

/// Load, override from env, and validate the full configuration.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    dotenv::dotenv().ok();

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let mut config: AppConfig =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    if config.chains.is_empty() {
        bail!("config has no chains");
    }
    let mut ids = HashSet::new();
    for chain in &mut config.chains {
        chain.apply_env_overrides();
        chain.validate()?;
        if !ids.insert(chain.chain_id) {
            bail!("duplicate chain_id {}", chain.chain_id);
        }
    }
    Ok(config)
}
