use clap::Parser;

/// Generate circular consensus sequences (ccs) from subreads.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Output BAM file for consensus reads
    pub output: String,

    /// Input subread BAM files
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Overwrite OUTPUT file if present
    #[arg(long)]
    pub force: bool,

    /// Write a sidecar index for the OUTPUT file
    #[arg(long)]
    pub index: bool,

    /// Generate CCS for the provided comma-separated hole number ranges only.
    /// Default = all
    #[arg(long)]
    pub zmws: Option<String>,

    /// Minimum SNR of input subreads
    #[arg(long, default_value = "4.0")]
    pub min_snr: f32,

    /// Minimum read score of input subreads (0..1)
    #[arg(long, default_value = "0.75")]
    pub min_read_score: f32,

    /// Minimum number of subreads required to generate CCS for a ZMW
    #[arg(long, default_value = "3")]
    pub min_passes: usize,

    /// Minimum length of subreads to use for generating CCS
    #[arg(long, default_value = "10")]
    pub min_length: usize,

    /// Minimum predicted accuracy of the consensus
    #[arg(long, default_value = "0.9")]
    pub min_predicted_accuracy: f32,

    /// Number of CCS jobs to submit per work-queue slot
    #[arg(long, default_value = "1")]
    pub chunk_size: usize,

    /// Number of threads to use, 0 means autodetection
    #[arg(long, default_value = "0")]
    pub num_threads: usize,

    /// Where to write the results report, '-' for stdout
    #[arg(long, default_value = "ccs_report.csv")]
    pub report_file: String,

    /// Optional JSON copy of the results report
    #[arg(long)]
    pub report_json: Option<String>,
}
