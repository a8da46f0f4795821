use clap::Args;

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,
    #[arg(long)]
    pub accuracy: f64,
    #[arg(long, default_value = "manual")]
    pub source: String,
    #[arg(long)]
    pub cell_id: String,
    #[arg(long)]
    pub mcc: String,
    #[arg(long)]
    pub mnc: String,
    #[arg(long)]
    pub tac: String,
    #[arg(long, default_value = "LTE")]
    pub technology: String,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rssi: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rsrp: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub rsrq: i32,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub sinr: i32,
}

#[derive(Debug, Args)]
pub struct CellArgs {
    #[arg(long)]
    pub cell_id: i64,
    #[arg(long)]
    pub mcc: i64,
    #[arg(long)]
    pub mnc: i64,
    #[arg(long)]
    pub lac: i64,
}

#[derive(Debug, Args)]
pub struct LimitArgs {
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct MarkArgs {
    #[arg(required = true, num_args = 1..)]
    pub ids: Vec<i64>,
}
