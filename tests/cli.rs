use lipton::driver;
use lipton_opt::passes::Mode;
use lipton_opt::pipeline;
use std::path::Path;

fn demo(name: &str) -> lipton_ir::Program {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(name);
    driver::load_program(&path, None, vec![]).unwrap()
}

#[test]
fn counter_plan() {
    let program = demo("counter.json");
    let red = pipeline::run(&program, Mode::Static).unwrap();
    let mut out = vec![];
    red.plan.write_json(&mut out).unwrap();
    let plan: serde_json::Value = serde_json::from_slice(&out).unwrap();

    let threads = plan["threads"].as_array().unwrap();
    assert_eq!(threads.len(), 3);
    assert_eq!(threads[1]["proc"], "inc");
    // `count` is only ever touched under `m`, `total` is not.
    let main = threads[0]["actions"].as_array().unwrap();
    assert!(main.iter().any(|a| a["at"] == "main.entry[5]"));
    assert!(!main.iter().any(|a| a["at"] == "main.entry[3]"));
}

#[test]
fn annotated_program() {
    let program = demo("counter.json");
    let red = pipeline::run(&program, Mode::Dynamic).unwrap();
    let mut out = vec![];
    driver::write_annotated(&program, &red, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("@main proc main {"));
    assert!(text.contains("conflict-guarded-yield"));
}

#[test]
fn entrypoint_override() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/counter.json");
    let program =
        driver::load_program(&path, Some("peek"), vec![]).unwrap();
    let red = pipeline::run(&program, Mode::Static).unwrap();
    assert!(red.analysis.threads.is_sequential());
}

#[test]
fn missing_file() {
    let err = driver::load_program(Path::new("no/such/file.json"), None, vec![])
        .unwrap_err();
    assert!(err.to_string().contains("no/such/file.json"));
}
