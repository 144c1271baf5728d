use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use midi_to_mml::{convert_file, OutputFormat, OutputFormatter, Timebase};
use mml_core::{ConvertOptions, Converter, DotLimit, Granularity};

#[derive(Parser, Debug)]
#[command(name = "midi-to-mml")]
#[command(about = "Convert MIDI files to MML", long_about = None)]
struct Args {
    /// MIDI files to convert (default: uses first .mid file in current directory)
    input: Vec<PathBuf>,

    /// Output file path, only with a single input (default: `<midi-name>.txt`)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print output to stdout instead of file
    #[arg(long)]
    stdout: bool,

    /// Suppress informational messages (only errors)
    #[arg(short, long)]
    quiet: bool,

    /// Log every conversion step
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Write the macro table and symbols as JSON instead of MML
    #[arg(long)]
    json: bool,

    /// Maximum dots per note, -1 for no limit
    #[arg(long, default_value = "-1", allow_negative_numbers = true)]
    dots: i32,

    /// Timebase of the MML, 0 to keep the input timebase. Multiple of 4.
    #[arg(long, default_value = "48")]
    timebase: u32,

    /// Timebase of the input sequence, 0 to trust the file
    #[arg(long, default_value = "0")]
    input_timebase: u32,

    /// Shortest note value the quantizer aims for, 0 for exact lengths
    #[arg(long, default_value = "32")]
    quantize_precision: u32,

    /// Keep note lengths exactly as in the input
    #[arg(long)]
    no_quantize: bool,

    /// Swap the octave up and down commands
    #[arg(long)]
    octave_reverse: bool,

    /// Group triplet lengths into brackets
    #[arg(long)]
    use_triplet: bool,

    /// Separate notes and commands with spaces
    #[arg(long)]
    put_spaces: bool,

    /// Ignore expression controllers (CC 11)
    #[arg(long)]
    no_expression: bool,

    /// Scale every volume by this factor
    #[arg(long, default_value = "1.0")]
    multiply_volumes: f64,

    /// Use raw MIDI pan values
    #[arg(long)]
    no_pan_correction: bool,

    /// Drop instrument, pan and volume macros
    #[arg(long)]
    no_control_changes: bool,

    /// Write every length as a tick count
    #[arg(long)]
    use_ticks: bool,
}

impl Args {
    fn convert_options(&self) -> Result<ConvertOptions> {
        let options = ConvertOptions {
            max_dots: DotLimit::from_count(self.dots)?,
            quantize: !self.no_quantize,
            reverse_octave: self.octave_reverse,
            use_triplets: self.use_triplet,
            put_spaces: self.put_spaces,
            ignore_expression: self.no_expression,
            volume_multiplier: self.multiply_volumes,
            no_pan_correction: self.no_pan_correction,
            no_control_changes: self.no_control_changes,
            quantize_precision: Granularity::from_note(self.quantize_precision)?,
            use_ticks: self.use_ticks,
        };
        options.validate()?;
        Ok(options)
    }

    fn timebase(&self) -> Timebase {
        Timebase {
            input: self.input_timebase,
            target: self.timebase,
        }
    }

    fn formatter(&self) -> OutputFormatter {
        OutputFormatter::new(if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Mml
        })
    }
}

fn init_logging(args: &Args) {
    let level = if args.quiet {
        tracing::Level::ERROR
    } else if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            tracing::error!("{} file(s) failed to convert", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Convert every input, returning how many failed.
fn run(args: &Args) -> Result<usize> {
    let converter = Converter::new(args.convert_options()?);
    let formatter = args.formatter();

    let inputs = if args.input.is_empty() {
        vec![find_first_midi_file()?]
    } else {
        args.input.clone()
    };
    if args.output.is_some() && inputs.len() > 1 {
        anyhow::bail!("--output can only be used with a single input file");
    }

    let mut failed = 0;
    for midi_path in &inputs {
        if let Err(e) = convert_one(args, &converter, &formatter, midi_path) {
            tracing::error!("{}: {:#}", midi_path.display(), e);
            failed += 1;
        }
    }
    Ok(failed)
}

fn convert_one(
    args: &Args,
    converter: &Converter,
    formatter: &OutputFormatter,
    midi_path: &Path,
) -> Result<()> {
    if !midi_path.exists() {
        anyhow::bail!("MIDI file not found: {}", midi_path.display());
    }
    tracing::info!("Processing MIDI file: {}", midi_path.display());

    let conversion = convert_file(midi_path, args.timebase(), converter)?;
    let output = formatter.build(&conversion)?;

    if args.stdout {
        // Print directly to stdout (clean, no logs)
        print!("{}", output);
        return Ok(());
    }

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| formatter.default_path(midi_path));
    fs::write(&output_path, output)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    tracing::info!("Output saved to {}", output_path.display());
    Ok(())
}

fn find_first_midi_file() -> Result<PathBuf> {
    let entries = fs::read_dir(".").context("Failed to read current directory")?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_midi = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mid"));
        if is_midi {
            candidates.push(path);
        }
    }
    candidates.sort();

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No MIDI files found in current directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_onto_options() {
        let args = Args::parse_from([
            "midi-to-mml",
            "--dots",
            "1",
            "--quantize-precision",
            "0",
            "--octave-reverse",
            "--multiply-volumes",
            "0.5",
            "song.mid",
        ]);
        let options = args.convert_options().unwrap();
        assert_eq!(options.max_dots, DotLimit::Max(1));
        assert_eq!(options.quantize_precision, Granularity::Exact);
        assert!(options.reverse_octave);
        assert!(options.quantize);
        assert_eq!(options.volume_multiplier, 0.5);
        assert_eq!(args.timebase(), Timebase::default());
        assert_eq!(args.input, vec![PathBuf::from("song.mid")]);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let args = Args::parse_from(["midi-to-mml", "--quantize-precision", "12"]);
        assert!(args.convert_options().is_err());
        let args = Args::parse_from(["midi-to-mml", "--dots", "-2"]);
        assert!(args.convert_options().is_err());
        let args = Args::parse_from(["midi-to-mml", "--multiply-volumes", "0"]);
        assert!(args.convert_options().is_err());
    }
}
