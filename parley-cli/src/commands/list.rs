//! List command implementation

use anyhow::Result;
use parley_core::voting::BUILTIN_STRATEGIES;
use parley_core::BackendRegistry;
use std::io::{self, Write};

/// Print every registered backend with its traits
pub fn backends() -> Result<()> {
    let registry = BackendRegistry::global();
    let mut out = io::stdout().lock();
    writeln!(out, "Available backends:")?;
    for entry in registry.snapshot() {
        let descriptor = entry.descriptor();
        let status = if entry.is_available() {
            "available"
        } else {
            "unavailable"
        };
        writeln!(
            out,
            "  {:<10} reliability {}  {:<6} {}",
            descriptor.name(),
            descriptor.reliability(),
            descriptor.latency().to_string(),
            status
        )?;
    }
    Ok(())
}

/// Print the built-in voting strategies
pub fn strategies() -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "Voting strategies:")?;
    for name in BUILTIN_STRATEGIES {
        writeln!(out, "  {:<14} {}", name, describe(name))?;
    }
    Ok(())
}

fn describe(strategy: &str) -> &'static str {
    match strategy {
        "weighted" => "confidence scaled by squared backend reliability",
        "hard" => "one vote per backend for its top language",
        "soft" => "mean of full probability distributions",
        _ => "languages chosen by at least N backends",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_described() {
        for name in BUILTIN_STRATEGIES {
            assert!(!describe(name).is_empty());
        }
        assert_ne!(describe("weighted"), describe("hard"));
    }
}
