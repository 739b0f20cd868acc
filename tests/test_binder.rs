use parking_lot::Mutex;
use proptest::prelude::*;
use pych::{
    declare, library_name_for, CallDescriptor, CallError, Declaration, DeclarationError,
    DispatchError, FromC, FromChapel, FromExtern, MaterializationError, NativeHandle, NativeType,
    Runtime, SourceLanguage, TypeTag, Value,
};
use std::env::consts::DLL_EXTENSION;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Handle that adds its integral arguments
struct Adder {
    configured: Option<(Vec<NativeType>, NativeType)>,
}

impl NativeHandle for Adder {
    fn configure(&mut self, args: &[NativeType], ret: NativeType) {
        self.configured = Some((args.to_vec(), ret));
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, DispatchError> {
        let (_, ret) = self.configured.as_ref().ok_or(DispatchError::Unconfigured)?;
        let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
        Ok(match ret {
            NativeType::CInt => Value::Int(sum as i32),
            _ => Value::Long(sum),
        })
    }
}

#[derive(Default)]
struct MockRuntime {
    hints: Mutex<Vec<String>>,
    materialized: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl Runtime for MockRuntime {
    fn hint(&self, descriptor: &Arc<CallDescriptor>) {
        self.hints.lock().push(descriptor.host_name.clone());
    }

    fn materialize(
        &self,
        descriptor: &CallDescriptor,
    ) -> Result<Box<dyn NativeHandle>, MaterializationError> {
        self.materialized.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.fail {
            return Err(MaterializationError::new(
                descriptor.external_symbol_name.clone(),
                descriptor.library_name.clone(),
                "compilation failed",
            ));
        }
        Ok(Box::new(Adder { configured: None }))
    }
}

fn add_decl() -> Declaration {
    declare!(add(a: Int, b: Int) -> Int)
}

#[test]
fn test_add_scenario() {
    let runtime = Arc::new(MockRuntime::default());
    let add = FromExtern::new(runtime.clone())
        .source_file("add.c")
        .language(SourceLanguage::C)
        .bind(add_decl())
        .unwrap();

    let desc = add.descriptor();
    assert_eq!(desc.argument_names, vec!["a", "b"]);
    assert_eq!(desc.argument_types, vec![TypeTag::Int, TypeTag::Int]);
    assert_eq!(desc.return_type, TypeTag::Int);
    assert_eq!(desc.external_symbol_name, "add");
    assert_eq!(desc.library_name, Some(format!("libadd.{}", DLL_EXTENSION)));
    assert_eq!(desc.source_language, Some(SourceLanguage::C));

    assert_eq!(add.call(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
}

#[cfg(target_os = "linux")]
#[test]
fn test_add_scenario_linux_library_name() {
    let add = FromC::new(Arc::new(MockRuntime::default()))
        .source_file("add.c")
        .bind(add_decl())
        .unwrap();
    assert_eq!(add.descriptor().library_name.as_deref(), Some("libadd.so"));
}

#[test]
fn test_hint_on_bind() {
    let runtime = Arc::new(MockRuntime::default());
    FromChapel::new(runtime.clone())
        .source_file("foo.chpl")
        .bind(declare!(foo(x: Float) -> Float))
        .unwrap();

    assert_eq!(*runtime.hints.lock(), vec!["foo".to_string()]);
    assert_eq!(runtime.materialized.load(Ordering::SeqCst), 0);
}

#[test]
fn test_chapel_library_name() {
    let call = FromChapel::new(Arc::new(MockRuntime::default()))
        .source_file("foo.chpl")
        .bind(declare!(foo() -> None))
        .unwrap();
    assert_eq!(call.descriptor().library_name, Some(library_name_for(Path::new("foo.chpl"))));
    assert_eq!(call.descriptor().library_name, Some(format!("libfoo.{}", DLL_EXTENSION)));
}

#[test]
fn test_lazy_and_idempotent_materialization() {
    let runtime = Arc::new(MockRuntime::default());
    let add = FromC::new(runtime.clone()).source_file("add.c").bind(add_decl()).unwrap();

    assert!(!add.is_materialized());
    assert!(add.descriptor().native_handle().is_none());

    add.call(&[Value::Int(1), Value::Int(1)]).unwrap();
    assert!(add.is_materialized());

    add.call(&[Value::Int(4), Value::Int(5)]).unwrap();
    assert_eq!(runtime.materialized.load(Ordering::SeqCst), 1);
}

#[test]
fn test_type_mismatch_never_materializes() {
    let runtime = Arc::new(MockRuntime::default());
    let add = FromC::new(runtime.clone()).source_file("add.c").bind(add_decl()).unwrap();

    let cases: Vec<Vec<Value>> = vec![
        vec![Value::Int(1), Value::Long(2)],
        vec![Value::Int(1)],
        vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        vec![Value::Float(1.0), Value::Int(2)],
    ];
    for args in cases {
        match add.call(&args) {
            Err(CallError::TypeMismatch { actual, expected, .. }) => {
                assert_eq!(actual, args.iter().map(Value::type_tag).collect::<Vec<_>>());
                assert_eq!(expected, vec![TypeTag::Int, TypeTag::Int]);
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    assert_eq!(runtime.materialized.load(Ordering::SeqCst), 0);
    assert!(!add.is_materialized());
}

#[test]
fn test_materialization_failure_retries() {
    let runtime = Arc::new(MockRuntime {
        fail: true,
        ..Default::default()
    });
    let add = FromC::new(runtime.clone()).source_file("add.c").bind(add_decl()).unwrap();

    for attempt in 1..=3 {
        let err = add.call(&[Value::Int(1), Value::Int(2)]).unwrap_err();
        assert!(matches!(err, CallError::Materialization(ref e) if e.reason == "compilation failed"));
        assert_eq!(runtime.materialized.load(Ordering::SeqCst), attempt);
    }
}

#[test]
fn test_late_caller_shares_running_failure() {
    let runtime = Arc::new(MockRuntime {
        fail: true,
        delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let add = FromC::new(runtime.clone()).source_file("add.c").bind(add_decl()).unwrap();

    let first = {
        let add = add.clone();
        thread::spawn(move || add.call(&[Value::Int(1), Value::Int(2)]))
    };
    thread::sleep(Duration::from_millis(50));
    let second = {
        let add = add.clone();
        thread::spawn(move || add.call(&[Value::Int(3), Value::Int(4)]))
    };

    for worker in [first, second] {
        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, CallError::Materialization(ref e) if e.reason == "compilation failed"));
    }
    assert_eq!(runtime.materialized.load(Ordering::SeqCst), 1);
}

#[test]
fn test_declaration_errors_precede_runtime() {
    let runtime = Arc::new(MockRuntime::default());
    let binder = FromExtern::new(runtime.clone());

    let err = binder
        .bind(
            Declaration::new("f")
                .with_arg_names(["a"])
                .with_arg_types([TypeTag::Int, TypeTag::Int]),
        )
        .unwrap_err();
    assert!(matches!(err, DeclarationError::ArityMismatch { names: 1, types: 2, .. }));

    let err = binder.bind(declare!(g(a: Int, b: None) -> Int)).unwrap_err();
    assert_eq!(
        err,
        DeclarationError::UnsupportedType { function: "g".into(), argument: "b".into(), ty: TypeTag::None }
    );

    assert!(runtime.hints.lock().is_empty());
}

#[test]
fn test_concurrent_first_calls_materialize_once() {
    let runtime = Arc::new(MockRuntime {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let add = FromC::new(runtime.clone()).source_file("add.c").bind(add_decl()).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let add = add.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                add.call(&[Value::Int(i), Value::Int(1)])
            })
        })
        .collect();

    for (i, worker) in workers.into_iter().enumerate() {
        assert_eq!(worker.join().unwrap(), Ok(Value::Int(i as i32 + 1)));
    }
    assert_eq!(runtime.materialized.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handle_configured_from_type_map() {
    let runtime = Arc::new(MockRuntime::default());
    let total = FromC::new(runtime)
        .library("libsum.so")
        .bind(declare!(total(a: Long, b: Long) -> Long))
        .unwrap();

    assert_eq!(total.call(&[Value::Long(40), Value::Long(2)]), Ok(Value::Long(42)));
    assert!(total.descriptor().native_handle().is_some());
}

fn tag_strategy() -> impl Strategy<Value = TypeTag> {
    prop_oneof![
        Just(TypeTag::Bool),
        Just(TypeTag::Int),
        Just(TypeTag::Long),
        Just(TypeTag::Float),
        Just(TypeTag::Str),
        Just(TypeTag::Unicode),
    ]
}

proptest! {
    #[test]
    fn prop_declared_signature_is_preserved(
        types in prop::collection::vec(tag_strategy(), 0..8),
        ret in prop_oneof![Just(TypeTag::None), tag_strategy()],
    ) {
        let names: Vec<String> = (0..types.len()).map(|i| format!("arg{}", i)).collect();
        let decl = Declaration::new("f")
            .with_arg_names(names.clone())
            .with_arg_types(types.clone())
            .returns(ret);

        let call = FromExtern::new(Arc::new(MockRuntime::default())).bind(decl).unwrap();
        let desc = call.descriptor();
        prop_assert_eq!(&desc.argument_names, &names);
        prop_assert_eq!(&desc.argument_types, &types);
        prop_assert_eq!(desc.return_type, ret);
    }

    #[test]
    fn prop_arity_mismatch_always_rejected(names in 0usize..6, types in 0usize..6) {
        prop_assume!(names != types);
        let decl = Declaration::new("f")
            .with_arg_names((0..names).map(|i| format!("a{}", i)))
            .with_arg_types(std::iter::repeat(TypeTag::Int).take(types));

        let runtime = Arc::new(MockRuntime::default());
        let result = FromExtern::new(runtime.clone()).bind(decl);
        prop_assert!(
            matches!(result, Err(DeclarationError::ArityMismatch { .. })),
            "expected arity mismatch"
        );
        prop_assert!(runtime.hints.lock().is_empty());
    }
}

#[cfg(all(feature = "native", target_os = "linux", target_env = "gnu"))]
mod native {
    use super::*;
    use pych::{DylibRuntime, RuntimeConfig};

    fn libc_binder(runtime: &Arc<DylibRuntime>) -> FromC {
        FromC::new(runtime.clone()).library("libc.so.6")
    }

    #[test]
    fn test_libc_calls() {
        let runtime = Arc::new(DylibRuntime::new(RuntimeConfig::default()));

        let abs = libc_binder(&runtime).bind(declare!(abs(x: Int) -> Int)).unwrap();
        assert_eq!(abs.call(&[Value::Int(-7)]), Ok(Value::Int(7)));

        let labs = libc_binder(&runtime).bind(declare!(labs(x: Long) -> Long)).unwrap();
        assert_eq!(labs.call(&[Value::Long(-1 << 40)]), Ok(Value::Long(1 << 40)));

        let atoi = libc_binder(&runtime).bind(declare!(atoi(s: Str) -> Int)).unwrap();
        assert_eq!(atoi.call(&[Value::from("1234")]), Ok(Value::Int(1234)));

        let getenv = libc_binder(&runtime)
            .bind(declare!(getenv(name: Str) -> Str))
            .unwrap();
        assert_eq!(
            getenv.call(&[Value::from("PYCH_SURELY_UNSET_VARIABLE")]),
            Ok(Value::None)
        );

        assert_eq!(runtime.loaded_libraries(), 1);
    }

    #[test]
    fn test_missing_symbol() {
        let runtime = Arc::new(DylibRuntime::default());
        let call = libc_binder(&runtime)
            .bind(declare!(pych_no_such_symbol() -> None))
            .unwrap();
        match call.call(&[]) {
            Err(CallError::Materialization(err)) => assert!(err.reason.starts_with("symbol not found")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_renamed_symbol() {
        let runtime = Arc::new(DylibRuntime::default());
        let absolute = libc_binder(&runtime)
            .symbol("abs")
            .bind(declare!(absolute(x: Int) -> Int))
            .unwrap();
        assert_eq!(absolute.call(&[Value::Int(-3)]), Ok(Value::Int(3)));
    }
}
