use clap::Parser;
use php_zval::phpt::CompatMatrix;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "phpt-scan")]
#[command(about = "Classify directive-header test files into a compatibility matrix", long_about = None)]
struct Cli {
    /// Test file or directory
    #[arg(name = "PATH")]
    path: PathBuf,

    /// Recursively search directories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Only scan files whose path contains this text
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Print the matrix as JSON
    #[arg(long)]
    json: bool,

    /// List divergent files in the text report
    #[arg(short = 'd', long)]
    divergent: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let files = collect_test_files(&cli.path, cli.recursive, cli.filter.as_deref())?;
    if files.is_empty() {
        eprintln!("No test files found in {}", cli.path.display());
        return Ok(());
    }

    let mut matrix = CompatMatrix::new();
    for file in &files {
        matrix.scan_file(file);
    }

    if cli.json {
        println!("{}", matrix.to_json()?);
    } else {
        print!("{}", matrix.render_text(cli.divergent));
    }

    Ok(())
}

fn is_test_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("php") | Some("phpt")
    )
}

fn collect_test_files(
    path: &Path,
    recursive: bool,
    filter: Option<&str>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let keep = |p: &Path| filter.is_none_or(|f| p.to_string_lossy().contains(f));

    if path.is_file() {
        if is_test_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        let depth = if recursive { usize::MAX } else { 1 };
        for entry in WalkDir::new(path)
            .max_depth(depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let entry_path = entry.path();
            if entry_path.is_file() && is_test_file(entry_path) && keep(entry_path) {
                files.push(entry_path.to_path_buf());
            }
        }
    } else {
        anyhow::bail!("{} does not exist", path.display());
    }

    // Sort files for consistent ordering
    files.sort();

    Ok(files)
}
