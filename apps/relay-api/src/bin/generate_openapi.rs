use std::process::ExitCode;

use utoipa::OpenApi;

fn main() -> ExitCode {
    let spec = match relay_api::routes::ApiDoc::openapi().to_pretty_json() {
        Ok(spec) => spec,
        Err(err) => {
            eprintln!("failed to render OpenAPI document: {err}");
            return ExitCode::FAILURE;
        }
    };

    let out = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/relay-api.json");
    let written = out
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(&out, spec));

    match written {
        Ok(()) => {
            println!("Wrote {}", out.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to write {}: {err}", out.display());
            ExitCode::FAILURE
        }
    }
}
