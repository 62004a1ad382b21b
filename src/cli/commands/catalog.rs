use crate::catalog::catalog;
use crate::cli::utils::format_table;
use crate::cli::OutputFormat;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let entries = catalog().entries();

    if output_format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            let converts: Vec<&str> = e.convertible_to.iter().map(|t| t.key()).collect();
            vec![
                e.key.key().to_string(),
                e.label.clone(),
                format!("{:?}", e.category).to_lowercase(),
                e.default_width.to_string(),
                if e.read_only { "yes" } else { "" }.to_string(),
                converts.join(","),
            ]
        })
        .collect();
    println!("{}", format_table(&["key", "label", "category", "width", "read-only", "converts to"], &rows));
    Ok(())
}
