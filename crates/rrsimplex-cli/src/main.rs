use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use plotters::coord::Shift;
use plotters::prelude::*;
use rrsimplex_lib::{
    error::{Failure, SimplexError},
    io::{tabular::TabularLoader, text as text_io},
    metrics::triplets::normalize_triplets,
    pipeline::{Pipeline, ProcessResponse},
    plot::{figure_from_simplex, SimplexFigure, SimplexLayout},
    signal::{RRSeries, SamplingRate},
    storage::{ArtifactRole, ArtifactStore, ExportSelection, ImageFormat},
    synthetic, SimplexConfig,
};
use serde::Serialize;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "rrsimplex",
    version,
    about = "ECG R-peaks → RR intervals → simplex triplets, with exportable artifacts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct StorageArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides storage.upload_dir
    #[arg(long)]
    upload_dir: Option<PathBuf>,
    /// Overrides storage.export_dir
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

impl StorageArgs {
    fn load(&self) -> Result<SimplexConfig> {
        let mut config = SimplexConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.upload_dir {
            config.storage.upload_dir = dir.clone();
        }
        if let Some(dir) = &self.export_dir {
            config.storage.export_dir = dir.clone();
        }
        Ok(config)
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PlotFormat {
    Png,
    Svg,
}

impl From<PlotFormat> for ImageFormat {
    fn from(f: PlotFormat) -> Self {
        match f {
            PlotFormat::Png => ImageFormat::Png,
            PlotFormat::Svg => ImageFormat::Svg,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the column names of a delimited recording
    Columns {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Upload a recording and derive R-peaks, RR intervals and simplex triplets
    Process {
        #[arg(long)]
        input: PathBuf,
        /// Column holding the ECG lead; the last column is the timestamp
        #[arg(long)]
        lead: String,
        /// Also render the simplex plot in this format
        #[arg(long)]
        plot: Option<PlotFormat>,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Render the simplex plot of an already processed recording
    Plot {
        #[arg(long)]
        basename: String,
        #[arg(long, default_value = "svg")]
        format: PlotFormat,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Store an externally rendered PNG/SVG plot next to the tables
    UploadImage {
        #[arg(long)]
        input: PathBuf,
        /// Target name, e.g. simplex_plot_<basename>.png (defaults to the input name)
        #[arg(long)]
        filename: Option<String>,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Bundle selected artifacts into ecg_export_<basename>.zip
    Export {
        #[arg(long)]
        basename: String,
        #[arg(long)]
        rpeaks: bool,
        #[arg(long)]
        rr: bool,
        #[arg(long)]
        img: bool,
        #[arg(long)]
        norm: bool,
        /// Archive path (defaults to ./ecg_export_<basename>.zip)
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Convert newline-delimited peak indices into RR intervals (seconds)
    RrIntervals {
        #[arg(long)]
        peaks: Option<PathBuf>,
        #[arg(long)]
        fs: u32,
    },
    /// Normalize newline-delimited RR intervals into simplex triplets
    Triplets {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Write a synthetic ECG recording as CSV (lead column + timestamp)
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 250)]
        fs: u32,
        /// Comma-separated RR intervals in seconds
        #[arg(long, value_delimiter = ',', default_value = "0.8,0.82,0.79,0.81,0.8,0.83,0.78")]
        rr: Vec<f64>,
        #[arg(long, default_value = "II")]
        lead: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Columns { input, config } => cmd_columns(&input, config.as_deref())?,
        Commands::Process {
            input,
            lead,
            plot,
            storage,
        } => cmd_process(&input, &lead, plot, &storage)?,
        Commands::Plot {
            basename,
            format,
            storage,
        } => cmd_plot(&basename, format, &storage)?,
        Commands::UploadImage {
            input,
            filename,
            storage,
        } => cmd_upload_image(&input, filename.as_deref(), &storage)?,
        Commands::Export {
            basename,
            rpeaks,
            rr,
            img,
            norm,
            out,
            storage,
        } => {
            let selection = ExportSelection {
                rpeaks,
                rr,
                image: img,
                normalized: norm,
            };
            cmd_export(&basename, selection, out.as_deref(), &storage)?
        }
        Commands::RrIntervals { peaks, fs } => cmd_rr_intervals(peaks.as_deref(), fs)?,
        Commands::Triplets { input } => cmd_triplets(input.as_deref())?,
        Commands::Synth { out, fs, rr, lead } => cmd_synth(&out, fs, &rr, &lead)?,
    }
    Ok(())
}

/// Print the structured failure on stdout and turn it into a process error.
fn report<T>(result: Result<T, SimplexError>) -> Result<T> {
    result.map_err(|err| {
        if let Ok(js) = serde_json::to_string(&Failure::from(&err)) {
            println!("{}", js);
        }
        anyhow!(err)
    })
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => text_io::read_text(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn cmd_columns(input: &Path, config: Option<&Path>) -> Result<()> {
    let config = SimplexConfig::load(config)?;
    let loader = TabularLoader::new(&config.loader)?;
    let columns = report(loader.read_columns(input))?;
    println!("{}", serde_json::to_string(&columns)?);
    Ok(())
}

fn cmd_process(
    input: &Path,
    lead: &str,
    plot: Option<PlotFormat>,
    storage: &StorageArgs,
) -> Result<()> {
    let config = storage.load()?;
    let pipeline = Pipeline::from_config(&config)?;
    let result = pipeline.process_upload(input, lead);
    println!("{}", serde_json::to_string(&ProcessResponse::from(&result))?);
    let outcome = result.map_err(|err| anyhow!(err))?;
    if let Some(format) = plot {
        let path = store_plot(
            pipeline.store(),
            &outcome.basename,
            &outcome.derivation.triplets.points,
            format.into(),
        )?;
        log::info!("rendered {}", path.display());
    }
    Ok(())
}

fn cmd_plot(basename: &str, format: PlotFormat, storage: &StorageArgs) -> Result<()> {
    let store = ArtifactStore::new(storage.load()?.storage);
    let points = report(store.read_normalized(basename))?;
    let path = store_plot(&store, basename, &points, format.into())?;
    println!("{}", path.display());
    Ok(())
}

fn store_plot(
    store: &ArtifactStore,
    basename: &str,
    points: &[rrsimplex_lib::SimplexPoint],
    format: ImageFormat,
) -> Result<PathBuf> {
    let fig = figure_from_simplex(basename, points, &SimplexLayout::default());
    let bytes = render_simplex(&fig, format)?;
    let filename = ArtifactRole::SimplexPlot.file_name(basename, format.extension());
    let stored = report(store.store_image(&filename, &bytes))?;
    Ok(stored.path)
}

fn render_simplex(fig: &SimplexFigure, format: ImageFormat) -> Result<Vec<u8>> {
    let size = (fig.width, fig.height);
    match format {
        ImageFormat::Svg => {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
                draw_simplex(&root, fig)?;
                root.present()?;
            }
            Ok(svg.into_bytes())
        }
        ImageFormat::Png => {
            let tmp = tempfile::Builder::new()
                .suffix(".png")
                .tempfile()
                .context("creating temporary PNG")?;
            {
                let root = BitMapBackend::new(tmp.path(), size).into_drawing_area();
                draw_simplex(&root, fig)?;
                root.present()?;
            }
            fs::read(tmp.path()).context("reading rendered PNG")
        }
    }
}

fn draw_simplex<DB>(root: &DrawingArea<DB, Shift>, fig: &SimplexFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let px = |p: [f64; 2]| (p[0].round() as i32, p[1].round() as i32);
    let rgb = |c: rrsimplex_lib::plot::Color| {
        let (r, g, b) = c.rgb();
        RGBColor(r, g, b)
    };

    root.fill(&WHITE)?;
    for seg in &fig.grid {
        root.draw(&PathElement::new(
            vec![px(seg.from), px(seg.to)],
            rgb(seg.style.color).stroke_width(seg.style.width.round().max(1.0) as u32),
        ))?;
    }
    let [a, b, c] = fig.vertices;
    root.draw(&PathElement::new(
        vec![px(a), px(b), px(c), px(a)],
        rgb(fig.outline.color).stroke_width(fig.outline.width.round().max(1.0) as u32),
    ))?;
    for tick in &fig.ticks {
        root.draw(&Text::new(
            tick.text.clone(),
            px(tick.at),
            ("sans-serif", tick.size),
        ))?;
    }
    if let Some(title) = &fig.title {
        root.draw(&Text::new(title.clone(), (10, 10), ("sans-serif", 16.0)))?;
    }
    let radius = fig.point_radius.round() as i32;
    let fill = rgb(fig.point_color).filled();
    for p in &fig.points {
        root.draw(&Circle::new(px(*p), radius, fill))?;
    }
    Ok(())
}

fn cmd_upload_image(input: &Path, filename: Option<&str>, storage: &StorageArgs) -> Result<()> {
    let store = ArtifactStore::new(storage.load()?.storage);
    let filename = match filename {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("input has no usable file name")?,
    };
    let bytes = fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let stored = report(store.store_image(&filename, &bytes))?;
    println!("{}", stored.path.display());
    Ok(())
}

#[derive(Serialize)]
struct ExportSummary<'a> {
    archive: &'a Path,
    included: &'a [String],
    skipped: &'a [String],
}

fn cmd_export(
    basename: &str,
    selection: ExportSelection,
    out: Option<&Path>,
    storage: &StorageArgs,
) -> Result<()> {
    let store = ArtifactStore::new(storage.load()?.storage);
    let bundle = report(store.export(basename, selection))?;
    let out = out
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&bundle.archive_name));
    bundle.write_to(&out)?;
    let summary = ExportSummary {
        archive: &out,
        included: &bundle.included,
        skipped: &bundle.skipped,
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_rr_intervals(peaks: Option<&Path>, fs: u32) -> Result<()> {
    let fs = SamplingRate::new(fs).context("--fs must be positive")?;
    let events = text_io::parse_peak_indices(&read_input(peaks)?)?;
    let rr = RRSeries::from_events(&events, fs);
    println!("{}", serde_json::to_string(&rr)?);
    Ok(())
}

fn cmd_triplets(input: Option<&Path>) -> Result<()> {
    let rr = text_io::parse_rr_series(&read_input(input)?)?;
    let triplets = report(normalize_triplets(&rr))?;
    println!("{}", serde_json::to_string(&triplets)?);
    Ok(())
}

fn cmd_synth(out: &Path, fs: u32, rr: &[f64], lead: &str) -> Result<()> {
    if fs == 0 {
        return Err(anyhow!("--fs must be positive"));
    }
    let signal = synthetic::synthetic_ecg(fs, rr);
    let timestamps = synthetic::timestamps(fs, signal.len());
    let mut writer = csv::Writer::from_path(out)
        .with_context(|| format!("creating {}", out.display()))?;
    writer.write_record([lead, "timestamp"])?;
    for (value, t) in signal.iter().zip(&timestamps) {
        writer.serialize((value, t))?;
    }
    writer.flush()?;
    println!("{}", out.display());
    Ok(())
}
