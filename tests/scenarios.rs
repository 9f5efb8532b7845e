//! End-to-end detection scenarios driven through the worker pipeline
//! with synthetic pool state, plus the literal acceptance cases for the
//! decoder, optimizer, and prioritizer.

use alloy::primitives::{Address, I256, U256};
use arbscan::config::{
    ChainConfig, DetectorSettings, FlashLoanConfig, GasConfig, PoolConfig, Thresholds,
};
use arbscan::events::decoder::{decode, encode_v2_sync, RawLog, V2_SYNC_TOPIC};
use arbscan::events::PoolEvent;
use arbscan::optimizer::golden_section;
use arbscan::prioritizer::{AdaptivePrioritizer, PairTier, PrioritizerConfig};
use arbscan::source::SourceUpdate;
use arbscan::types::{DexDescriptor, DexFamily, PoolSnapshot, Token, TokenClass, V2Snapshot};
use arbscan::worker::{WorkerCore, WorkerMessage};
use arbscan::{OpportunityKind, PairKey};
use tokio::sync::mpsc;

fn e18(x: u64) -> U256 {
    U256::from(x) * U256::from(10u64).pow(U256::from(18))
}

/// BSC-flavored two-DEX chain: WBNB/BUSD on dex-a and dex-b.
fn bsc_chain() -> ChainConfig {
    ChainConfig {
        chain_id: 56,
        name: "bsc".into(),
        enabled: true,
        block_time_ms: 3_000,
        native_token: "WBNB".into(),
        rpc_endpoints: vec!["http://localhost:8545".into()],
        rate_limit_rpm: 300,
        dexes: vec![
            DexDescriptor::new("dex-a", DexFamily::ConstantProductV2, 0.0025),
            DexDescriptor::new("dex-b", DexFamily::ConstantProductV2, 0.0025),
        ],
        tokens: vec![
            Token::new("WBNB", Address::repeat_byte(1), 18, TokenClass::Native),
            Token::new("BUSD", Address::repeat_byte(2), 18, TokenClass::Stable),
        ],
        pools: vec![
            PoolConfig {
                address: Address::repeat_byte(0xA0),
                dex: "dex-a".into(),
                token0: "WBNB".into(),
                token1: "BUSD".into(),
            },
            PoolConfig {
                address: Address::repeat_byte(0xB0),
                dex: "dex-b".into(),
                token0: "WBNB".into(),
                token1: "BUSD".into(),
            },
        ],
        base_tokens: vec!["WBNB".into(), "BUSD".into()],
        stable_tokens: vec!["BUSD".into()],
        lsds: vec![],
        thresholds: Thresholds {
            min_profit_percent: 0.3,
            min_profit_usd: 1.0,
            min_trade_usd: 100.0,
            max_trade_usd: 10_000.0,
        },
        gas: GasConfig {
            base_units: 150_000,
            units_per_hop: 110_000,
            // ~$0.50 per two-hop trade at a $300 WBNB.
            gas_price_gwei: 4.5,
            has_l1_data_fee: false,
            l1_fee_per_byte_wei: 0,
        },
        flash_loan: FlashLoanConfig {
            provider: Some("pancake-flash".into()),
            fee: 0.0025,
        },
        detectors: DetectorSettings::default(),
    }
}

fn pool_update(addr: u8, r0: U256, r1: U256, block: u64) -> SourceUpdate {
    SourceUpdate::Pool {
        address: Address::repeat_byte(addr),
        snapshot: PoolSnapshot::V2(V2Snapshot::new(r0, r1, block)),
    }
}

async fn run_scenario(
    chain: ChainConfig,
    updates: Vec<SourceUpdate>,
    block: u64,
) -> Vec<arbscan::Opportunity> {
    let (tx, mut rx) = mpsc::channel(256);
    let mut core = WorkerCore::new(chain, tx);
    for update in updates {
        core.handle_update(update).await;
    }
    core.handle_update(SourceUpdate::Block {
        number: block,
        observed_ms: 1_000_000,
    })
    .await;

    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let WorkerMessage::Opportunity(opp) = message {
            out.push(opp);
        }
    }
    out
}

#[tokio::test]
async fn two_dex_spread_base_scenario() {
    // DEX A quotes 300 BUSD/WBNB, DEX B 310: a ~3.3% spread.
    let updates = vec![
        pool_update(0xA0, e18(1_000), e18(300_000), 99),
        pool_update(0xB0, e18(1_000), e18(310_000), 99),
        // Second application so liquidity valuation sees the anchors.
        pool_update(0xA0, e18(1_000), e18(300_000), 99),
        pool_update(0xB0, e18(1_000), e18(310_000), 99),
    ];
    let found = run_scenario(bsc_chain(), updates, 99).await;

    assert_eq!(found.len(), 1, "expected exactly one opportunity");
    let opp = &found[0];
    assert_eq!(opp.kind, OpportunityKind::TwoDex);
    assert!(!opp.amount_in.is_zero());
    assert!(opp.net_profit_usd > 0.0, "net {}", opp.net_profit_usd);

    // WBNB is cheap on dex-a: the dex-a leg acquires it, the dex-b leg
    // disposes of it.
    let buy_leg = opp.hops.iter().find(|h| h.dex == "dex-a").expect("dex-a leg");
    assert_eq!(buy_leg.to, "WBNB");
    let sell_leg = opp.hops.iter().find(|h| h.dex == "dex-b").expect("dex-b leg");
    assert_eq!(sell_leg.from, "WBNB");
}

#[tokio::test]
async fn tight_spread_rejected() {
    // ~0.16% spread cannot clear two 0.25% fees plus the 0.3% floor.
    let updates = vec![
        pool_update(0xA0, e18(1_000), e18(300_000), 99),
        pool_update(0xB0, e18(1_000), e18(300_500), 99),
        pool_update(0xA0, e18(1_000), e18(300_000), 99),
        pool_update(0xB0, e18(1_000), e18(300_500), 99),
    ];
    let found = run_scenario(bsc_chain(), updates, 99).await;
    assert!(found.is_empty(), "got {:?}", found.len());
}

/// One-DEX triangular chain: USDC -> WMATIC -> WETH -> USDC at 1.02 per
/// leg before fees.
fn triangle_chain() -> ChainConfig {
    let mut chain = bsc_chain();
    chain.chain_id = 137;
    chain.name = "polygon".into();
    chain.block_time_ms = 2_000;
    chain.native_token = "WMATIC".into();
    chain.dexes = vec![DexDescriptor::new(
        "quickswap",
        DexFamily::ConstantProductV2,
        0.003,
    )];
    chain.tokens = vec![
        Token::new("WMATIC", Address::repeat_byte(1), 18, TokenClass::Native),
        Token::new("USDC", Address::repeat_byte(2), 18, TokenClass::Stable),
        Token::new("WETH", Address::repeat_byte(3), 18, TokenClass::BlueChip),
    ];
    chain.pools = vec![
        PoolConfig {
            address: Address::repeat_byte(0xA1),
            dex: "quickswap".into(),
            token0: "USDC".into(),
            token1: "WMATIC".into(),
        },
        PoolConfig {
            address: Address::repeat_byte(0xA2),
            dex: "quickswap".into(),
            token0: "WMATIC".into(),
            token1: "WETH".into(),
        },
        PoolConfig {
            address: Address::repeat_byte(0xA3),
            dex: "quickswap".into(),
            token0: "WETH".into(),
            token1: "USDC".into(),
        },
    ];
    chain.base_tokens = vec!["USDC".into()];
    chain.stable_tokens = vec!["USDC".into()];
    chain.flash_loan = FlashLoanConfig {
        provider: None,
        fee: 0.0025,
    };
    chain
}

#[tokio::test]
async fn triangular_cycle_with_fees() {
    let updates: Vec<SourceUpdate> = [0xA1u8, 0xA2, 0xA3]
        .iter()
        .flat_map(|&addr| {
            // Each leg rates 1.02 (reserve_out / reserve_in).
            vec![
                pool_update(addr, e18(1_000_000), e18(1_020_000), 99),
                pool_update(addr, e18(1_000_000), e18(1_020_000), 99),
            ]
        })
        .collect();
    let found = run_scenario(triangle_chain(), updates, 99).await;

    let cycle = found
        .iter()
        .find(|o| o.kind == OpportunityKind::TriangularSingleDex && o.path[0] == "USDC")
        .expect("triangular opportunity");
    assert!(cycle.is_valid_cycle());
    assert!(cycle.expected_out > cycle.amount_in);
    // No flash-loan provider on this chain.
    assert!(!cycle.flash_loan_available);

    // Spot prediction: 1.02^3 * 0.997^3 - 1 ~ 5.17%. Realized profit is
    // positive but strictly below it (price impact).
    let spot = 1.02f64.powi(3) * 0.997f64.powi(3) - 1.0;
    let amount_in = cycle.amount_in.to_string().parse::<f64>().unwrap();
    let gross = cycle.gross_profit.to_string().parse::<f64>().unwrap();
    let realized = gross / amount_in;
    assert!(realized > 0.0);
    assert!(realized < spot, "realized {} vs spot {}", realized, spot);
}

#[test]
fn golden_section_known_peak() {
    let f = |x: U256| -> I256 {
        let xi = x.to::<u128>() as i128;
        I256::try_from(-(xi - 742) * (xi - 742)).unwrap()
    };
    let (x_star, _) = golden_section(&f, U256::from(100u64), U256::from(10_000u64), 15);
    let xi = x_star.to::<u128>() as i128;
    assert!((xi - 742).unsigned_abs() as f64 <= 742.0 * 0.01, "x* = {}", xi);
}

#[test]
fn v2_sync_decode_literal() {
    // Data: 1e18 then 2e18 as 32-byte words.
    let data = encode_v2_sync(
        U256::from(1_000_000_000_000_000_000u128),
        U256::from(2_000_000_000_000_000_000u128),
    );
    let raw = RawLog {
        address: Address::repeat_byte(0x42),
        topics: vec![V2_SYNC_TOPIC],
        data,
        block_number: 1,
        log_index: 0,
    };
    match decode(&raw).unwrap().event {
        PoolEvent::V2Sync { reserve0, reserve1 } => {
            assert_eq!(reserve0, U256::from(1_000_000_000_000_000_000u128));
            assert_eq!(reserve1, U256::from(2_000_000_000_000_000_000u128));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn tier_lifecycle() {
    let prioritizer = AdaptivePrioritizer::new(PrioritizerConfig::default(), None);
    let pair = PairKey::new("WETH", "USDC");

    // Registers at NORMAL.
    prioritizer.register(&pair, 1_000.0, 50_000.0, 0);
    assert_eq!(prioritizer.tier(&pair), Some(PairTier::Normal));

    // Opportunity promotes to HOT; HOT scans every block.
    prioritizer.record_opportunity(&pair, 1_000);
    assert_eq!(prioritizer.tier(&pair), Some(PairTier::Hot));
    for block in [100, 101, 102] {
        assert!(prioritizer.should_scan(&pair, block));
    }

    // Past the HOT staleness budget with no further opportunities:
    // demoted exactly one step.
    prioritizer.decay(1_000 + 6 * 60 * 1_000);
    assert_eq!(prioritizer.tier(&pair), Some(PairTier::Warm));

    // WARM gates on even blocks.
    assert!(prioritizer.should_scan(&pair, 100));
    assert!(!prioritizer.should_scan(&pair, 101));
    assert!(prioritizer.should_scan(&pair, 102));
}
