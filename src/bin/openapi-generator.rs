//! Print the OpenAPI document to stdout for offline tooling.

use roulette_arena::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() {
    let doc = ApiDoc::openapi();
    match doc.to_pretty_json() {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to render OpenAPI document: {err}"),
    }
}
