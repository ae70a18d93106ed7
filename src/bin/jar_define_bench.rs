use std::env;
use std::fs::File;
use std::sync::Arc;
use std::time::Instant;

use jvm_builtins::class::Method;
use jvm_builtins::exception::JavaResult;
use jvm_builtins::heap::ObjectRef;
use jvm_builtins::thread::Thread;
use jvm_builtins::value::Value;
use jvm_builtins::vm::{Engine, Vm};
use zip::ZipArchive;

/// Defining classes never runs bytecode.
struct NoEngine;

impl Engine for NoEngine {
    fn invoke(&self, _: &mut Thread, _: &Arc<Method>, _: Option<ObjectRef>, _: &[Value]) -> JavaResult<Value> {
        Ok(Value::NULL)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let jar_path = env::args().nth(1).expect("usage: jar_define_bench JAR_PATH");
    let mut zip = ZipArchive::new(File::open(&jar_path)?)?;
    let names: Vec<String> = (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|e| e.name().to_owned()))
        .filter_map(|name| name.strip_suffix(".class").map(str::to_owned))
        .collect();

    let vm = Vm::builder().engine(NoEngine).classpath(&jar_path).build()?;

    let mut defined: u64 = 0;
    let mut failed: u64 = 0;
    let start = Instant::now();
    for name in &names {
        match vm.resolve_class(name) {
            Ok(_) => defined += 1,
            Err(e) => {
                failed += 1;
                eprintln!("{name}: {e}");
            }
        }
    }
    let dur = start.elapsed();

    let secs = dur.as_secs_f64();
    let ns_per = if defined > 0 { dur.as_nanos() as f64 / defined as f64 } else { 0.0 };
    let heap_kb = vm.heap().read().bytes_used() as f64 / 1024.0;

    println!("jar_path={}", jar_path);
    println!("class_files={}", names.len());
    println!("defined_ok={} failed={}", defined, failed);
    println!("loaded_classes={}", vm.classes().len());
    println!("heap_kb={:.1}", heap_kb);
    println!("define_time_ms={:.3}", secs * 1000.0);
    println!("ns_per_class={:.1}", ns_per);

    Ok(())
}
