extern crate vergen;

use vergen::EmitBuilder;

pub fn main() {
  // NOTE: Emits the build timestamp and git SHA used in the version banner.
  // Outside a git checkout vergen falls back to defaults instead of failing.
  if let Err(e) = EmitBuilder::builder()
    .build_timestamp()
    .git_sha(false)
    .emit()
  {
    println!("cargo:warning=vergen: {}", e);
  }
}
