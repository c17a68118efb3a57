use std::fs;
use std::process::Command;

fn morph(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_morph"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute morph")
}

#[test]
fn grid_reports_node_and_index_counts() {
    let output = morph(&["grid", "--samples", "3"]);
    assert!(output.status.success(), "morph grid exited with error");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("grid 3x3: 9 nodes"), "unexpected output: {stdout}");
    assert!(stdout.contains("points: 9 indices"));
    // 12 undirected edges in a 3x3 grid
    assert!(stdout.contains("lines: 24 indices"));
    assert!(stdout.contains("triangles: 0 indices"));
}

#[test]
fn grid_clamps_sample_count() {
    let output = morph(&["grid", "--samples", "1"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("grid 2x2: 4 nodes"));
}

#[test]
fn lists_builtin_kernel_uniforms() {
    let output = morph(&["uniforms"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<_> = stdout
        .lines()
        .filter_map(|line| line.split(':').next())
        .collect();
    assert_eq!(names, ["diffusion", "heat_gen", "growth", "time_step"]);
}

#[test]
fn lists_kernel_uniforms_as_json() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let kernel = dir.path().join("kernel.wgsl");
    fs::write(
        &kernel,
        "struct UserUniforms {\n// BEGIN_USER_UNIFS\n    // comps 2 min -1 max 1\n    drift: vec4<f32>,\n// END_USER_UNIFS\n}\n",
    )
    .expect("Failed to write kernel");

    let output = morph(&["uniforms", kernel.to_str().unwrap(), "--json"]);
    assert!(output.status.success());

    let uniforms: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output is not JSON");
    assert_eq!(uniforms[0]["name"], "drift");
    assert_eq!(uniforms[0]["num_comps"], 2);
    assert_eq!(uniforms[0]["min_val"], -1.0);
}

#[test]
fn malformed_kernel_uniforms_fail() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let kernel = dir.path().join("broken.wgsl");
    fs::write(
        &kernel,
        "// BEGIN_USER_UNIFS\n// comps 9\nvec4 bad;\n// END_USER_UNIFS\n",
    )
    .expect("Failed to write kernel");

    let output = morph(&["uniforms", kernel.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}
