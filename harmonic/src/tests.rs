#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use serde_json::{json, Value};

    use crate::data::arrays::tests::write_split;
    use crate::{
        DataOptions, DatasetKind, InMemoryData, LocalOnly, ModelRegistry, OptimizerKind,
        Settings, SettingsError, TrainingOptions, UserOptions,
    };

    fn user_options(value: Value) -> UserOptions {
        value.as_object().cloned().unwrap()
    }

    fn write_cifar(data_dir: &Path) {
        let dir = data_dir.join("cifar_numpy");
        fs::create_dir_all(&dir).unwrap();
        for name in ["train", "valid", "test"] {
            write_split(&dir.join(format!("{name}.npz")), 2, 32);
        }
    }

    #[test]
    fn test_cifar_settings_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar(dir.path());
        let user = user_options(json!({
            "device_idxs": [0],
            "dataset": "cifar10",
            "model": "deep_cifar",
            "data_dir": dir.path(),
            "batch_size": 64,
        }));

        let mut settings = Settings::new(user.clone(), &ModelRegistry::builtin()).unwrap();
        settings.create_options(&LocalOnly).unwrap();

        let options = settings.options().unwrap();
        assert_eq!(options.dataset, DatasetKind::Cifar10);
        assert_eq!(options.batch_size, 64);
        assert_eq!(options.n_epochs, 250);
        assert_eq!(options.display_step, 25);
        assert_eq!(options.optimizer, OptimizerKind::Adam);
        assert!(!options.augment);
        assert_eq!(settings.user_options(), &user);

        match settings.data_options() {
            Some(DataOptions::InMemory(data)) => assert_eq!(data.test.len(), 2),
            other => panic!("Expected in-memory data, got {other:?}"),
        }
    }

    #[test]
    fn test_model_fn_matches_registry_entry() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar(dir.path());
        let registry = ModelRegistry::builtin();
        let user = user_options(json!({
            "device_idxs": [0],
            "dataset": "cifar10",
            "model": "deep_cifar",
            "data_dir": dir.path(),
        }));

        let mut settings = Settings::new(user, &registry).unwrap();
        settings.create_options(&LocalOnly).unwrap();

        let options = settings.options().unwrap();
        let expected = (registry.resolve("deep_cifar").unwrap())(options);
        assert_eq!((settings.model_fn())(options), expected);
        assert_eq!(settings.build_model().unwrap(), expected);
    }

    #[test]
    fn test_saved_settings_reload() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar(dir.path());
        let user = user_options(json!({
            "device_idxs": [0, 1, 2],
            "dataset": "cifar10",
            "model": "deep_cifar",
            "data_dir": dir.path(),
            "trial_num": "B",
            "comment": "second seed",
        }));

        let mut settings = Settings::new(user, &ModelRegistry::builtin()).unwrap();
        assert!(matches!(
            settings.save(dir.path().join("early.json")),
            Err(SettingsError::NotResolved)
        ));

        settings.create_options(&LocalOnly).unwrap();
        let path = dir.path().join("options.json");
        settings.save(&path).unwrap();

        let loaded = TrainingOptions::load(&path).unwrap();
        assert_eq!(&loaded, settings.options().unwrap());
        assert_eq!(loaded.trial_num, "B");
        assert_eq!(loaded.unrecognised.get("comment"), Some(&json!("second seed")));
    }

    #[test]
    fn test_data_options_can_be_replaced() {
        let dir = tempfile::tempdir().unwrap();
        write_cifar(dir.path());
        let user = user_options(json!({
            "device_idxs": [0],
            "dataset": "cifar10",
            "model": "deep_cifar",
            "data_dir": dir.path(),
        }));
        let mut settings = Settings::new(user, &ModelRegistry::builtin()).unwrap();
        settings.create_options(&LocalOnly).unwrap();

        let subset = InMemoryData::load(&dir.path().join("cifar_numpy"), "").unwrap();
        let train_len = subset.train.len();
        settings.set_data_options(DataOptions::InMemory(subset));
        assert_eq!(
            settings
                .data_options()
                .and_then(DataOptions::as_in_memory)
                .map(|d| d.train.len()),
            Some(train_len)
        );
    }

    #[test]
    fn test_invalid_required_value_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let user = user_options(json!({
            "device_idxs": "all",
            "dataset": "rotated_mnist",
            "model": "deep_mnist",
            "data_dir": dir.path(),
        }));
        let mut settings = Settings::new(user, &ModelRegistry::builtin()).unwrap();

        match settings.create_options(&LocalOnly) {
            Err(SettingsError::InvalidOption { key, .. }) => assert_eq!(key, "device_idxs"),
            other => panic!("Expected InvalidOption error, got {other:?}"),
        }
    }

    #[test]
    fn test_num_threads_per_queue_is_resolved_early() {
        let user = user_options(json!({
            "num_threads_per_queue": "many",
            "device_idxs": [0],
            "dataset": "imagenet",
            "model": "deep_imagenet",
            "data_dir": "data",
        }));

        match Settings::new(user, &ModelRegistry::builtin()) {
            Err(SettingsError::InvalidOption { key, .. }) => {
                assert_eq!(key, "num_threads_per_queue");
            }
            other => panic!("Expected InvalidOption error, got {other:?}"),
        }
    }
}
