use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use annot_rs::{non_max_suppression, DaqParams, Mask, MaskRecord, NmsMethod};

#[derive(Parser)]
#[command(name = "annot")]
#[command(
    about = "Annotation geometry tool — RLE mask stats, in-encoding translation, and NMS over JSON files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print area and bounding box per mask record, plus the union area
    Stats {
        /// Path to a JSON array of mask records ({"size": [H, W], "counts": ...})
        #[arg(long)]
        input: PathBuf,
    },
    /// Translate masks in encoding space and emit the transformed records
    Translate {
        /// Path to a JSON array of mask records
        #[arg(long)]
        input: PathBuf,

        /// Horizontal offset in pixels
        #[arg(long, allow_hyphen_values = true)]
        dx: i64,

        /// Vertical offset in pixels
        #[arg(long, allow_hyphen_values = true)]
        dy: i64,

        /// Target canvas height (defaults to each mask's own height)
        #[arg(long)]
        height: Option<u32>,

        /// Target canvas width (defaults to each mask's own width)
        #[arg(long)]
        width: Option<u32>,

        /// Emit compressed byte counts instead of integer counts
        #[arg(long)]
        compressed: bool,
    },
    /// Run non-maximum suppression over a detections JSON file
    Nms {
        /// Path to a JSON object with "boxes" (Nx4 tlbr), "scores", and
        /// optionally "classes"
        #[arg(long)]
        input: PathBuf,

        /// IoU threshold; boxes overlapping a kept box by strictly more are
        /// suppressed
        #[arg(long, default_value_t = 0.5)]
        thresh: f64,

        /// Box area convention: 0 = continuous coordinates, 1 = inclusive
        /// pixel grid
        #[arg(long, default_value_t = 0.0)]
        bias: f64,

        /// Use the divide-and-conquer implementation
        #[arg(long)]
        daq: bool,

        /// DAQ: partition size at which recursion stops
        #[arg(long, default_value_t = 2048)]
        stop_size: usize,

        /// DAQ: maximum recursion depth
        #[arg(long, default_value_t = 12)]
        max_depth: u32,

        /// DAQ: seam margin; inferred from the largest box when omitted
        #[arg(long)]
        diameter: Option<f64>,

        /// Suppress only between boxes sharing a class id
        #[arg(long)]
        class_aware: bool,
    },
}

#[derive(Deserialize)]
struct Detections {
    boxes: Vec<[f64; 4]>,
    scores: Vec<f64>,
    #[serde(default)]
    classes: Option<Vec<i64>>,
}

fn load_records(path: &Path) -> anyhow::Result<Vec<MaskRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {path:?}"))?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing mask records from {path:?}"))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Stats { input } => {
            let records = load_records(&input)?;
            eprintln!("Loaded {} mask records from {input:?}", records.len());
            let mut masks = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let mask = record
                    .to_mask()
                    .with_context(|| format!("record {i} is not a valid mask"))?;
                let [x, y, w, h] = mask.bbox()?;
                println!("mask {i}: area {} bbox [{x}, {y}, {w}, {h}]", mask.area()?);
                masks.push(mask);
            }
            if !masks.is_empty() {
                let merged = Mask::union(&masks)?;
                println!("union area: {}", merged.area()?);
            }
        }
        Command::Translate {
            input,
            dx,
            dy,
            height,
            width,
            compressed,
        } => {
            let records = load_records(&input)?;
            eprintln!("Translating {} masks by ({dx}, {dy})", records.len());
            let mut out = Vec::with_capacity(records.len());
            for (i, record) in records.iter().enumerate() {
                let mask = record
                    .to_mask()
                    .with_context(|| format!("record {i} is not a valid mask"))?;
                let (h, w) = mask.shape();
                let new_shape = (height.unwrap_or(h), width.unwrap_or(w));
                let moved = mask.translate((dx, dy), Some(new_shape))?;
                let record = if compressed {
                    MaskRecord::compressed(&moved)?
                } else {
                    MaskRecord::uncompressed(&moved)?
                };
                out.push(record);
            }
            println!("{}", serde_json::to_string(&out)?);
        }
        Command::Nms {
            input,
            thresh,
            bias,
            daq,
            stop_size,
            max_depth,
            diameter,
            class_aware,
        } => {
            let file = std::fs::File::open(&input).with_context(|| format!("opening {input:?}"))?;
            let dets: Detections = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("parsing detections from {input:?}"))?;
            eprintln!("Loaded {} boxes from {input:?}", dets.boxes.len());

            let method = if daq {
                NmsMethod::Daq(DaqParams {
                    stop_size,
                    max_depth,
                    diameter,
                })
            } else {
                NmsMethod::Greedy
            };
            let classes = if class_aware {
                Some(
                    dets.classes
                        .as_deref()
                        .context("--class-aware requires a \"classes\" field")?,
                )
            } else {
                None
            };

            let keep =
                non_max_suppression(&dets.boxes, &dets.scores, thresh, bias, classes, &method)?;
            eprintln!("Kept {} of {} boxes", keep.len(), dets.boxes.len());
            println!("{}", serde_json::to_string(&keep)?);
        }
    }

    Ok(())
}
