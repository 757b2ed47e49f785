use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lit_runner::Args::parse();

	lit_runner::run(args).await
}
