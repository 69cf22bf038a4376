fn main() {
    let code = churn_pipeline::api::cli::run();
    std::process::exit(code as i32);
}
