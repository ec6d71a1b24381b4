//! The consensus pipeline: stream subreads through the chunk builder on the
//! main thread, run consensus calls across the worker pool, and let a single
//! writer thread persist results in submission order.

pub mod chemistry;
pub mod chunker;
pub mod engine;
pub mod reader;
pub mod results;
pub mod settings;
pub mod types;
pub mod whitelist;
pub mod writer;

use crate::cli::Args;
use crate::workqueue::WorkQueue;
use anyhow::{anyhow, bail, Context, Result};
use chunker::ChunkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use reader::InputReadGroups;
use results::{write_json_report, write_report, ResultCounts, Results};
use rust_htslib::bam::{self, Read};
use settings::{resolve_thread_count, ConsensusSettings};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::thread;
use whitelist::Whitelist;
use writer::CcsWriter;

/// In-flight submissions allowed per worker before the producer blocks.
const BACKLOG_PER_WORKER: usize = 2;

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

pub fn run(args: &Args) -> Result<()> {
    let settings = ConsensusSettings {
        min_snr: args.min_snr,
        min_read_score: args.min_read_score,
        min_passes: args.min_passes,
        min_length: args.min_length,
        min_predicted_accuracy: args.min_predicted_accuracy,
        chunk_size: args.chunk_size,
    };
    if settings.min_passes < 1 {
        bail!("option --min-passes: invalid value: must be >= 1");
    }
    if Path::new(&args.output).exists() && !args.force {
        bail!("OUTPUT: file already exists: '{}' (use --force)", args.output);
    }
    let whitelist = args
        .zmws
        .as_deref()
        .map(Whitelist::parse)
        .transpose()
        .context("option --zmws: invalid specification")?;

    // Header pass over every input up front, so bad files fail before any
    // output is created.
    let mut inputs = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let reader = bam::Reader::from_path(file)
            .with_context(|| format!("cannot open input file '{}'", file))?;
        let header = bam::Header::from_template(reader.header());
        let read_groups = InputReadGroups::from_header(&header)
            .with_context(|| format!("invalid header in '{}'", file))?;
        inputs.push(read_groups);
    }

    let num_threads = resolve_thread_count(args.num_threads);
    info!("using {} worker threads", num_threads);

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let header = writer::prepare_header(&command_line, &inputs);
    let ccs_writer = CcsWriter::create(Path::new(&args.output), &header, args.index)?;

    let (queue, consumer) =
        WorkQueue::<Results>::ordered(num_threads, num_threads * BACKLOG_PER_WORKER);
    let writer_thread = thread::spawn(move || -> Result<ResultCounts> {
        let mut writer = ccs_writer;
        let mut counts = ResultCounts::default();
        while consumer.consume_with(|results| {
            writer.write(&results)?;
            counts += results.counts;
            Ok(())
        })? {}
        Ok(counts)
    });

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::default_spinner().template(SPINNER_TEMPLATE)?);

    let mut builder = ChunkBuilder::new(settings.clone(), whitelist);
    let produce_result = produce(queue, &mut builder, &settings, &args.files, &inputs, &progress);
    let mut counts = collect_writer(produce_result, writer_thread)?;
    counts += builder.counts();

    write_reports(&args.report_file, args.report_json.as_deref(), &counts)?;

    info!(
        "run complete: {} of {} ZMWs produced a consensus",
        counts.success,
        counts.total()
    );
    Ok(())
}

/// Producer side: streams every input file through the chunk builder and
/// submits batches under backpressure. Owns the queue so an early error
/// drops it, which lets the workers and the writer wind down.
fn produce(
    queue: WorkQueue<Results>,
    builder: &mut ChunkBuilder,
    settings: &ConsensusSettings,
    files: &[String],
    inputs: &[InputReadGroups],
    progress: &ProgressBar,
) -> Result<()> {
    let mut records_seen: u64 = 0;
    for (file, read_groups) in files.iter().zip(inputs) {
        let mut reader = bam::Reader::from_path(file)
            .with_context(|| format!("cannot open input file '{}'", file))?;
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.with_context(|| format!("error reading record from '{}'", file))?;
            let subread = reader::decode_subread(&record, read_groups)
                .with_context(|| format!("malformed record in '{}'", file))?;
            if let Some(batch) = builder.process(subread) {
                submit_batch(&queue, batch, settings)?;
            }
            records_seen += 1;
            if records_seen % 1000 == 0 {
                progress.set_message(format!("{} subreads processed", records_seen));
                progress.tick();
            }
        }
    }
    if let Some(batch) = builder.finish() {
        submit_batch(&queue, batch, settings)?;
    }
    progress.finish_with_message(format!("{} subreads processed", records_seen));
    queue.finalize()
}

/// Joins the writer thread and reconciles the two sides' outcomes. When the
/// writer failed, its error is the root cause: the producer only ever sees
/// the disconnected queue after that, so its error is reported second.
fn collect_writer(
    produce_result: Result<()>,
    writer_thread: thread::JoinHandle<Result<ResultCounts>>,
) -> Result<ResultCounts> {
    let writer_result = writer_thread
        .join()
        .map_err(|_| anyhow!("writer thread panicked"))?;
    match (produce_result, writer_result) {
        (Ok(()), Ok(counts)) => Ok(counts),
        (_, Err(e)) => Err(e.context("writer thread failed")),
        (Err(e), Ok(_)) => Err(e),
    }
}

fn write_reports(
    report_file: &str,
    report_json: Option<&str>,
    counts: &ResultCounts,
) -> Result<()> {
    if report_file == "-" {
        write_report(std::io::stdout().lock(), counts)?;
    } else {
        let report = File::create(report_file)
            .with_context(|| format!("cannot create report file '{}'", report_file))?;
        write_report(BufWriter::new(report), counts)?;
    }
    if let Some(json_path) = report_json {
        let report = File::create(json_path)
            .with_context(|| format!("cannot create report file '{}'", json_path))?;
        write_json_report(BufWriter::new(report), counts)?;
    }
    Ok(())
}

fn submit_batch(
    queue: &WorkQueue<Results>,
    batch: Vec<types::Chunk>,
    settings: &ConsensusSettings,
) -> Result<()> {
    let settings = settings.clone();
    queue.submit(move || engine::consensus(batch, &settings))
}
