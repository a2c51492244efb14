//! services/api/src/bin/openapi.rs
//!
//! Writes the API's OpenAPI 3.0 document to `openapi.json`, for consumers
//! that want the REST contract without standing up the server.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = "openapi.json";
    let document = ApiDoc::openapi().to_pretty_json()?;
    std::fs::write(path, document)?;
    println!("OpenAPI document written to {path}");
    Ok(())
}
