#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("LMS API: multi-tenant learning platform server");
    lms_api::run_server().await
}
