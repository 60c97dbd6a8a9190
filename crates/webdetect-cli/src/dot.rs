//! Rendering the dependency graph with graphviz. This needs the `dot` tool from
//! [graphviz](https://graphviz.org/download/) on the path, or passed via `--dot-path`.

use std::ffi::OsString;
use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::{bail, Context};

pub fn generate_svg_with_dot(dot_content: String, dot_path: Option<OsString>) -> anyhow::Result<String> {
    let dot_path = dot_path.unwrap_or_else(|| "dot".into());
    let mut child = Command::new(&dot_path)
        .arg("-Tsvg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("could not run {dot_path:?}"))?;

    let mut stdin = child.stdin.take().context("dot stdin unavailable")?;
    // Write from another thread so a full stdout pipe can't deadlock us.
    let writer = std::thread::spawn(move || stdin.write_all(dot_content.as_bytes()));

    let out = child.wait_with_output()?;
    let written = writer.join().map_err(|_| anyhow::anyhow!("dot writer thread panicked"))?;

    std::io::stderr().write_all(&out.stderr)?;
    if !out.status.success() {
        bail!("dot command failed with {}", out.status);
    }
    written?;
    Ok(String::from_utf8(out.stdout)?)
}
