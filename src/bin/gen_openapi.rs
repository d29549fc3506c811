use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Write the derived ApiDoc to openapi.json, or to the path given as first argument
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());
    let spec = n8n_versions_backend::api::openapi::ApiDoc::openapi();
    let json = serde_json::to_string_pretty(&spec)?;
    std::fs::write(&path, json)?;
    println!("Wrote {}", path);
    Ok(())
}
