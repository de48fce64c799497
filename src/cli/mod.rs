use crate::tvm::{
    BocOptions, Cell, CellHash, CellType, boc_to_base64, boc_to_hex, deserialize_boc_multi,
    serialize_boc_multi,
};
use anyhow::{Context, Result, bail};
use base64::Engine;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_with::{base64::Base64, serde_as};
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::Arc;

/// tonutils-cell CLI
#[derive(Parser, Debug)]
#[command(name = "tonutils-cell")]
#[command(about = "Inspect and convert Bag of Cells files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct BocInput {
    /// BoC text, or '-' to read it from stdin
    pub boc: String,
    /// Treat the input as hex
    #[arg(long, conflicts_with = "base64")]
    pub hex: bool,
    /// Treat the input as base64
    #[arg(long)]
    pub base64: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Hex,
    Base64,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the cell tree of every root
    Inspect {
        #[command(flatten)]
        input: BocInput,
        /// Print a JSON description instead of the tree
        #[arg(long)]
        json: bool,
    },
    /// Print the representation hash of every root
    Hash {
        #[command(flatten)]
        input: BocInput,
    },
    /// Re-serialize with the chosen flags
    Convert {
        #[command(flatten)]
        input: BocInput,
        /// Write the offset index
        #[arg(long)]
        idx: bool,
        /// Append a CRC32-C checksum
        #[arg(long)]
        crc32c: bool,
        /// Output encoding
        #[arg(short = 'o', long, value_enum, default_value = "base64")]
        output: OutputFormat,
    },
}

#[serde_as]
#[derive(Serialize, Debug)]
struct CellJson {
    cell_type: &'static str,
    bits: usize,
    data: String,
    level: u8,
    depth: u16,
    #[serde_as(as = "Base64")]
    hash: CellHash,
    references: Vec<usize>,
}

#[derive(Serialize, Debug)]
struct BocJson {
    roots: Vec<usize>,
    cells: Vec<CellJson>,
}

fn cell_type_name(cell_type: CellType) -> &'static str {
    match cell_type {
        CellType::Ordinary => "ordinary",
        CellType::PrunedBranch => "pruned_branch",
        CellType::MerkleProof => "merkle_proof",
        CellType::MerkleUpdate => "merkle_update",
    }
}

/// Flattens the cell graph breadth first, one entry per unique cell
fn describe(roots: &[Arc<Cell>]) -> BocJson {
    let mut index: HashMap<CellHash, usize> = HashMap::new();
    let mut order: Vec<Arc<Cell>> = Vec::new();
    let mut queue: VecDeque<Arc<Cell>> = VecDeque::new();

    for root in roots {
        if !index.contains_key(&root.hash()) {
            index.insert(root.hash(), order.len());
            order.push(root.clone());
            queue.push_back(root.clone());
        }
    }
    while let Some(cell) = queue.pop_front() {
        for child in cell.references() {
            if !index.contains_key(&child.hash()) {
                index.insert(child.hash(), order.len());
                order.push(child.clone());
                queue.push_back(child.clone());
            }
        }
    }

    let cells = order
        .iter()
        .map(|cell| CellJson {
            cell_type: cell_type_name(cell.cell_type()),
            bits: cell.bit_len(),
            data: cell.bits().to_hex(),
            level: cell.level(),
            depth: cell.depth(),
            hash: cell.hash(),
            references: cell.references().iter().map(|r| index[&r.hash()]).collect(),
        })
        .collect();

    BocJson {
        roots: roots.iter().map(|r| index[&r.hash()]).collect(),
        cells,
    }
}

impl BocInput {
    fn read_text(&self) -> Result<String> {
        if self.boc == "-" {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read BoC from stdin")?;
            return Ok(text);
        }
        Ok(self.boc.clone())
    }

    /// Decodes the input text into raw BoC bytes
    fn decode(&self) -> Result<Vec<u8>> {
        let text: String = self.read_text()?.split_whitespace().collect();
        if text.is_empty() {
            bail!("empty BoC input");
        }

        let as_hex = self.hex || (!self.base64 && text.bytes().all(|b| b.is_ascii_hexdigit()));
        let bytes = if as_hex {
            hex::decode(&text).context("failed to decode hex input")?
        } else {
            base64::engine::general_purpose::STANDARD
                .decode(&text)
                .context("failed to decode base64 input")?
        };
        log::debug!("Decoded {} BoC bytes", bytes.len());
        Ok(bytes)
    }

    fn roots(&self) -> Result<Vec<Arc<Cell>>> {
        let bytes = self.decode()?;
        let roots = deserialize_boc_multi(&bytes).context("failed to parse BoC")?;
        log::debug!("Parsed BoC with {} roots", roots.len());
        Ok(roots)
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Execute the command
    pub fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Inspect { input, json } => self.execute_inspect(input, *json),
            Commands::Hash { input } => self.execute_hash(input),
            Commands::Convert {
                input,
                idx,
                crc32c,
                output,
            } => self.execute_convert(input, BocOptions::new(*idx, *crc32c), *output),
        }
    }

    fn execute_inspect(&self, input: &BocInput, json: bool) -> Result<()> {
        let roots = input.roots()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&describe(&roots))?);
            return Ok(());
        }
        for (i, root) in roots.iter().enumerate() {
            log::info!(
                "Root #{}: {:?}, level {}, depth {}",
                i,
                root.cell_type(),
                root.level(),
                root.depth()
            );
            println!("{}", root);
        }
        Ok(())
    }

    fn execute_hash(&self, input: &BocInput) -> Result<()> {
        for root in input.roots()? {
            println!("{}", hex::encode(root.hash()));
        }
        Ok(())
    }

    fn execute_convert(
        &self,
        input: &BocInput,
        options: BocOptions,
        output: OutputFormat,
    ) -> Result<()> {
        let roots = input.roots()?;
        log::debug!("Converting with {}", serde_json::to_string(&options)?);

        let encoded = if let [root] = roots.as_slice() {
            match output {
                OutputFormat::Hex => boc_to_hex(root, &options)?,
                OutputFormat::Base64 => boc_to_base64(root, &options)?,
            }
        } else {
            let bytes = serialize_boc_multi(&roots, &options)?;
            match output {
                OutputFormat::Hex => hex::encode(bytes),
                OutputFormat::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
            }
        };
        println!("{}", encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::{Builder, base64_to_boc};

    fn input(boc: &str) -> BocInput {
        BocInput {
            boc: boc.to_string(),
            hex: false,
            base64: false,
        }
    }

    #[test]
    fn test_input_autodetect() {
        let hex = input("b5ee9c72 01010101 0002 0000 00");
        let b64 = input("te6ccgEBAQEAAgAAAA==");
        assert_eq!(hex.decode().unwrap(), b64.decode().unwrap());
        assert_eq!(hex.roots().unwrap()[0].hash(), Cell::empty().hash());
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "tonutils-cell",
            "convert",
            "te6ccgEBAQEAAgAAAA==",
            "--crc32c",
            "-o",
            "hex",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert {
                idx, crc32c, output, ..
            } => {
                assert!(!idx);
                assert!(crc32c);
                assert_eq!(output, OutputFormat::Hex);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["tonutils-cell", "hash", "x", "--hex", "--base64"]).is_err());
    }

    #[test]
    fn test_describe_shares_cells() {
        let leaf = Arc::new(Cell::empty());
        let mut root = Builder::new();
        root.store_u8(0x01).unwrap();
        root.store_ref(leaf.clone()).unwrap();
        root.store_ref(leaf).unwrap();
        let root = root.build().unwrap();

        let json = serde_json::to_value(describe(&[root.clone()])).unwrap();
        assert_eq!(json["roots"], serde_json::json!([0]));
        assert_eq!(json["cells"].as_array().unwrap().len(), 2);
        assert_eq!(json["cells"][0]["references"], serde_json::json!([1, 1]));
        assert_eq!(json["cells"][0]["data"], "01");
        let hash = base64::engine::general_purpose::STANDARD.encode(root.hash());
        assert_eq!(json["cells"][0]["hash"], hash);

        let boc = boc_to_base64(&root, &BocOptions::default()).unwrap();
        assert_eq!(base64_to_boc(&boc).unwrap().hash(), root.hash());
    }
}
