//! rollup-explain: 离线查看查询的路由决策
//!
//! 用法:
//!   rollup-explain queries.json
//!
//! queries.json 为查询描述数组；配置文件路径取自 `ROLLUP_CONFIG`，
//! 缺省为 config/rollup.toml，不存在时使用内置默认配置。

use anyhow::Context;
use std::env;
use std::fs;

use rollup_router::query::plan::MeasurePlan;
use rollup_router::query::QueryDescriptor;
use rollup_router::utils::{init_logger, AppConfig};
use rollup_router::utils::config::DEFAULT_CONFIG_PATH;

fn load_config() -> AppConfig {
    let path = env::var("ROLLUP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    match AppConfig::load_from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}; using built-in defaults", e);
            AppConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logger("info");

    let path = env::args()
        .nth(1)
        .context("usage: rollup-explain <queries.json>")?;
    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let queries: Vec<serde_json::Value> =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path))?;

    let config = load_config();
    let router = config.build_router()?;

    for (i, value) in queries.into_iter().enumerate() {
        let descriptor = match QueryDescriptor::from_value(value) {
            Ok(d) => d,
            Err(e) => {
                println!("#{} rejected: {}", i, e);
                continue;
            }
        };

        let source = router.route(&descriptor);
        let decision = router.explain(&descriptor);
        println!("#{} {}", i, descriptor);
        println!("   -> {} ({})", source, serde_json::to_string(&decision.reason)?);

        for score in decision.candidates.iter().filter(|s| s.is_eligible()) {
            println!(
                "      {:<28} score={:<4} exact={}",
                score.rollup, score.score, score.exact_match
            );
        }

        if let Some(rollup) = router.catalog().get(&source) {
            match MeasurePlan::for_rollup(rollup, &descriptor) {
                Ok(plan) => println!("   SELECT {}", plan.select_list().join(", ")),
                Err(e) => println!("   plan error: {}", e),
            }
        }
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&router.stats())?);
    Ok(())
}
