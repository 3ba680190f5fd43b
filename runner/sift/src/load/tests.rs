use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sift_model::entity::{ClassDef, FunctionDef, MethodDef, ModuleDef};
use sift_model::{Config, ConfigSpec};

use super::*;
use crate::import::MapSource;
use crate::plugin::{registry, PluginManager};
use crate::testing::{self, TraceLog};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, "").unwrap();
}

fn loader_with(spec: ConfigSpec, source: MapSource) -> Loader {
    let config = Arc::new(Config::from_spec(spec).unwrap());
    let mut manager = PluginManager::new(registry::default_plugins());
    manager.configure(&config).unwrap();
    Loader::new(config, Arc::new(manager), Arc::new(source))
}

fn loader(source: MapSource) -> Loader {
    loader_with(ConfigSpec::default(), source)
}

fn ids(suite: Suite) -> Vec<String> {
    suite
        .flatten()
        .into_iter()
        .map(|c| c.id().to_string())
        .collect()
}

#[test]
fn discovers_files_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["test_b.py", "test_a.py", "util.py"] {
        touch(&dir.path().join(name));
    }
    let source = MapSource::new();
    source.register(dir.path().join("test_a.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_one", 1, testing::pass()))
            .function(FunctionDef::plain("test_two", 2, testing::pass()))
    });
    source.register(dir.path().join("test_b.py"), |name, file| {
        ModuleDef::new(name, file).function(FunctionDef::plain("test_three", 1, testing::pass()))
    });

    let suite = loader(source).load_from_dir(dir.path());
    assert_eq!(
        ids(suite),
        vec!["test_a.test_one", "test_a.test_two", "test_b.test_three"]
    );
}

#[test]
fn functions_sort_by_line_classes_by_name() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_late", 20, testing::pass()))
            .function(FunctionDef::plain("test_early", 5, testing::pass()))
            .class(
                ClassDef::new("TestZeta")
                    .method(MethodDef::plain("test_m2", 12, testing::pass()))
                    .method(MethodDef::plain("test_m1", 10, testing::pass())),
            )
            .class(ClassDef::new("TestAlpha").method(MethodDef::plain("test_a", 3, testing::pass())))
    });

    let suite = loader(source).load_from_dir(dir.path());
    assert_eq!(
        ids(suite),
        vec![
            "test_mod.TestAlpha.test_a",
            "test_mod.TestZeta.test_m1",
            "test_mod.TestZeta.test_m2",
            "test_mod.test_early",
            "test_mod.test_late",
        ]
    );
}

#[test]
fn unselected_names_are_filtered_out() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_yes", 1, testing::pass()))
            .function(FunctionDef::plain("helper", 2, testing::pass()))
            .class(ClassDef::new("Helper").method(MethodDef::plain("test_x", 3, testing::pass())))
    });

    let suite = loader(source).load_from_dir(dir.path());
    assert_eq!(ids(suite), vec!["test_mod.test_yes"]);
}

#[test]
fn package_modules_carry_the_package_scope() {
    let dir = tempfile::tempdir().unwrap();
    let init = dir.path().join("test_pack/__init__.py");
    let module = dir.path().join("test_pack/test_mod.py");
    touch(&init);
    touch(&module);

    let log = TraceLog::new();
    let setup = log.hook("setup:test_pack");
    let source = MapSource::new();
    source.register(init, move |name, file| {
        ModuleDef::new(name, file)
            .package()
            .attr("setup", setup.clone())
    });
    source.register(module, |name, file| {
        ModuleDef::new(name, file).function(FunctionDef::plain("test_one", 1, testing::pass()))
    });

    let cases = loader(source).load_from_dir(dir.path()).flatten();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].id(), "test_pack.test_mod.test_one");
    let chain: Vec<&str> = cases[0].chain().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(chain, vec!["test_pack", "test_pack.test_mod"]);
}

#[test]
fn generator_cases_expand_with_argument_ids() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file).function(FunctionDef::generator(
            "test_gen",
            1,
            testing::generator(&["(0,)", "(1,)", "(2,)"]),
        ))
    });

    let suite = loader(source).load_from_dir(dir.path());
    assert_eq!(
        ids(suite),
        vec![
            "test_mod.test_gen:(0,)",
            "test_mod.test_gen:(1,)",
            "test_mod.test_gen:(2,)",
        ]
    );
}

#[test]
fn generator_error_becomes_a_failing_case() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        let generator: sift_model::GenFn =
            Arc::new(|_| Err(TestError::error("bad parametrize")));
        ModuleDef::new(name, file).function(FunctionDef::generator("test_gen", 1, generator))
    });

    let cases = loader(source).load_from_dir(dir.path()).flatten();
    assert_eq!(cases.len(), 1);
    assert!(cases[0].is_load_failure());
    assert_eq!(cases[0].id(), "test_mod.test_gen");
}

#[test]
fn import_error_becomes_a_failing_case() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    // Nothing registered for the file.
    let cases = loader(MapSource::new()).load_from_dir(dir.path()).flatten();
    assert_eq!(cases.len(), 1);
    assert!(cases[0].is_load_failure());
}

#[test]
fn address_restricts_to_a_function() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_one", 1, testing::pass()))
            .function(FunctionDef::plain("test_two", 2, testing::pass()))
    });

    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        source,
    );
    assert_eq!(ids(loader.load_from_name("test_mod:test_two")), vec!["test_mod.test_two"]);
}

#[test]
fn address_restricts_to_a_class_or_method() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .class(
                ClassDef::new("TestA")
                    .method(MethodDef::plain("test_x", 1, testing::pass()))
                    .method(MethodDef::plain("test_y", 2, testing::pass())),
            )
            .class(ClassDef::new("TestB").method(MethodDef::plain("test_z", 3, testing::pass())))
    });

    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        source,
    );
    assert_eq!(
        ids(loader.load_from_name("test_mod:TestA")),
        vec!["test_mod.TestA.test_x", "test_mod.TestA.test_y"]
    );
    assert_eq!(
        ids(loader.load_from_name("test_mod:TestA.test_y")),
        vec!["test_mod.TestA.test_y"]
    );
}

#[test]
fn explicitly_named_module_bypasses_the_pattern() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("helpers.py"));
    let source = MapSource::new();
    source.register(dir.path().join("helpers.py"), |name, file| {
        ModuleDef::new(name, file).function(FunctionDef::plain("test_one", 1, testing::pass()))
    });

    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        source,
    );
    assert_eq!(ids(loader.load_from_name("helpers")), vec!["helpers.test_one"]);
}

#[test]
fn file_addresses_resolve_to_module_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("test_pack/test_mod.py");
    touch(&dir.path().join("test_pack/__init__.py"));
    touch(&file);
    let source = MapSource::new();
    source.register(dir.path().join("test_pack/__init__.py"), |name, file| {
        ModuleDef::new(name, file).package()
    });
    source.register(file.clone(), |name, file| {
        ModuleDef::new(name, file).function(FunctionDef::plain("test_one", 1, testing::pass()))
    });

    let loader = loader(source);
    let address = format!("{}:test_one", file.display());
    assert_eq!(
        ids(loader.load_from_name(&address)),
        vec!["test_pack.test_mod.test_one"]
    );
}

#[test]
fn callable_only_address_reuses_the_previous_module() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("test_mod.py"));
    let source = MapSource::new();
    source.register(dir.path().join("test_mod.py"), |name, file| {
        ModuleDef::new(name, file)
            .function(FunctionDef::plain("test_one", 1, testing::pass()))
            .function(FunctionDef::plain("test_two", 2, testing::pass()))
    });

    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        source,
    );
    let suite = loader.load_from_names(&[
        "test_mod:test_one".to_string(),
        ":test_two".to_string(),
    ]);
    assert_eq!(ids(suite), vec!["test_mod.test_one", "test_mod.test_two"]);
}

#[test]
fn callable_only_address_without_context_fails() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        MapSource::new(),
    );
    let cases = loader.load_from_name(":test_one").flatten();
    assert_eq!(cases.len(), 1);
    assert!(cases[0].is_load_failure());
}

#[test]
fn missing_module_address_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader_with(
        ConfigSpec {
            workdir: dir.path().to_path_buf(),
            ..ConfigSpec::default()
        },
        MapSource::new(),
    );
    let cases = loader.load_from_name("no_such_mod").flatten();
    assert_eq!(cases.len(), 1);
    assert!(cases[0].is_load_failure());
}
