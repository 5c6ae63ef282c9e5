use clap::Parser;

/// This is a replay and tabulation program for collaborative estimation sessions.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The session description to replay: participants, rules and the
    /// recorded script of actions. For the file format, read the documentation of
    /// the estimation_voting crate.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference file containing the expected summary in JSON format.
    /// If provided, destimate will check that the replayed outcome matches the
    /// reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the session will
    /// be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// Overrides the random seed of the session file. Useful to explore how the
    /// item selection balances across participants.
    #[clap(long, value_parser)]
    pub seed: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
