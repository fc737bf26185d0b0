//! Loading `launch.toml` from disk

use std::io::Write;

use launch_bundler::config::Config;
use launch_bundler::LaunchError;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[launch]
wallet_count = 7
swap_amount_sol = 0.02

[jito]
tip_sol = 0.002

[token]
name = "Example"
symbol = "EXM"
"#,
    );

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.launch.wallet_count, 7);
    assert_eq!(config.swap_lamports(), 20_000_000);
    assert_eq!(config.tip_lamports(), 2_000_000);
    assert_eq!(config.token.symbol, "EXM");
    assert_eq!(config.launch.wallets_per_batch, 5);
    assert_eq!(config.registry.max_attempts, 6);
    assert_eq!(config.sweep.sell_attempts, 10);
    assert_eq!(config.wallet.treasury_env, "PRIVATE_KEY");
}

#[test]
fn test_oversized_batches_rejected() {
    let file = write_config("[launch]\nwallets_per_batch = 6\n");
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert!(matches!(
        config.validate(),
        Err(LaunchError::Configuration(_))
    ));
}

#[test]
fn test_bad_tip_account_rejected() {
    let file = write_config("[jito]\ntip_accounts = [\"not-an-address\"]\n");
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("jito.tip_accounts"));
}

#[test]
fn test_malformed_file_is_an_error() {
    let file = write_config("[launch\nwallet_count = ");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}
