pub mod blocks;
pub mod compound;
pub mod config;
pub mod convolve;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use mvdecon_core::block::BlockPartitioner;
use mvdecon_core::config::DeconConfig;
use mvdecon_core::psf::PsfType;

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Fixed,
    VariablePrecise,
    VariableSimple,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PsfTypeArg {
    Independent,
    EfficientBayesian,
    OptimizationI,
    OptimizationIi,
}

impl From<PsfTypeArg> for PsfType {
    fn from(arg: PsfTypeArg) -> Self {
        match arg {
            PsfTypeArg::Independent => PsfType::Independent,
            PsfTypeArg::EfficientBayesian => PsfType::EfficientBayesian,
            PsfTypeArg::OptimizationI => PsfType::OptimizationI,
            PsfTypeArg::OptimizationIi => PsfType::OptimizationII,
        }
    }
}

/// Block layout options shared by the commands that partition volumes.
#[derive(Args)]
pub struct PartitionArgs {
    /// Partition strategy (defaults to the config file's, or fixed)
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Block extent for the fixed strategy, e.g. "128" or "128x128x64"
    #[arg(long, default_value = "256")]
    pub block_size: String,

    /// Blocks per dimension for the variable strategies, e.g. "3x2x1"
    #[arg(long, default_value = "2")]
    pub num_blocks: String,
}

impl PartitionArgs {
    /// The partitioner selected on the command line, if any.
    pub fn partitioner(&self) -> Result<Option<BlockPartitioner>> {
        let Some(strategy) = self.strategy else {
            return Ok(None);
        };
        Ok(Some(match strategy {
            StrategyArg::Fixed => BlockPartitioner::FixedSizePrecise {
                block_size: parse_extent(&self.block_size).context("Invalid --block-size")?,
            },
            StrategyArg::VariablePrecise => BlockPartitioner::VariableSizePrecise {
                num_blocks: parse_extent(&self.num_blocks).context("Invalid --num-blocks")?,
            },
            StrategyArg::VariableSimple => BlockPartitioner::VariableSizeSimple {
                num_blocks: parse_extent(&self.num_blocks).context("Invalid --num-blocks")?,
            },
        }))
    }

    /// Set `config.partitioner` from the command line. Without a strategy
    /// option, a config file's partitioner is kept; otherwise the synthetic
    /// volumes are split with the variable size precise strategy.
    pub fn apply(&self, config: &mut DeconConfig, from_file: bool) -> Result<()> {
        if let Some(partitioner) = self.partitioner()? {
            config.partitioner = partitioner;
        } else if !from_file {
            config.partitioner = BlockPartitioner::VariableSizePrecise {
                num_blocks: parse_extent(&self.num_blocks).context("Invalid --num-blocks")?,
            };
        }
        Ok(())
    }
}

/// Parse "1025x1024x117" (or comma separated) into per-dimension values.
pub fn parse_extent(s: &str) -> Result<Vec<usize>> {
    let values = s
        .split(['x', ','])
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("'{part}' is not a non-negative integer"))
        })
        .collect::<Result<Vec<_>>>()?;
    if values.is_empty() || values.len() > 3 {
        bail!("expected 1 to 3 values, got '{s}'");
    }
    Ok(values)
}

/// Load a TOML config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<DeconConfig> {
    let Some(path) = path else {
        return Ok(DeconConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).context("Invalid configuration")
}
