fn main() {
    stake_pipeline::cli::run();
}
