use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::layout::compile;
use crate::parser::parse;
use crate::render::{render_svg, write_output_svg};
use crate::style::load_stylesheet;
use crate::text_metrics::SystemShaper;

#[derive(Parser, Debug)]
#[command(name = "sequin", version, about = "Sequence diagram compiler")]
pub struct Args {
    /// Diagram file to compile, or '-' for stdin
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output file name
    #[arg(short = 'o', long = "output", value_name = "OUT", default_value = "res.png")]
    pub output: PathBuf,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "png")]
    pub output_format: OutputFormat,

    /// JSON5 style overlay mapping dotted selectors to values
    #[arg(short = 's', long = "style", value_name = "STYLE")]
    pub style: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let source = read_input(&args.input)?;
    let style = load_stylesheet(args.style.as_deref())?;

    let ast = parse(&source)?;
    let compiled = compile(&ast, &style, &SystemShaper)?;
    let svg = render_svg(&compiled);

    match args.output_format {
        OutputFormat::Svg => write_output_svg(&svg, Some(&args.output))?,
        OutputFormat::Png => write_png(&svg, &args.output)?,
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path) -> Result<()> {
    crate::render::write_output_png(svg, output)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: &Path) -> Result<()> {
    Err(anyhow::anyhow!("png output requires the `png` feature"))
}
