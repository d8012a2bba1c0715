// SealedPrefs — CLI Command Handlers
//
// Each function handles one CLI subcommand. They open the SQLite substrate
// for the named store, provision its key through the configured backend, and
// work through the encrypted store.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::enclave::KeyProvisioner;
use crate::error::PrefsError;
use crate::store::{EncryptedPreferences, SqliteSubstrate, StoredValue, Substrate};

use super::{Cli, Commands, ValueKind};

type Store = EncryptedPreferences<SqliteSubstrate>;

/// Execute the parsed CLI command.
pub fn execute(cli: Cli) -> Result<(), PrefsError> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Get { store, key, kind } => cmd_get(&config, &store, &key, kind),
        Commands::Put {
            store,
            key,
            value,
            kind,
            apply,
        } => cmd_put(&config, &store, &key, &value, kind, apply),
        Commands::PutSet { store, key, values } => cmd_put_set(&config, &store, &key, values),
        Commands::Remove { store, key } => cmd_remove(&config, &store, &key),
        Commands::Contains { store, key } => cmd_contains(&config, &store, &key),
        Commands::List { store } => cmd_list(&config, &store),
        Commands::Clear { store } => cmd_clear(&config, &store),
        Commands::Raw { store } => cmd_raw(&config, &store),
        Commands::DeleteKey { store, yes } => cmd_delete_key(&config, &store, yes),
    }
}

fn open_store(config: &Config, name: &str) -> Result<Store, PrefsError> {
    let provisioner = config.provisioner()?;
    let substrate = SqliteSubstrate::open(&config.database_path(), name)?;
    EncryptedPreferences::open(substrate, provisioner.as_ref())
}

fn committed(ok: bool) -> Result<(), PrefsError> {
    if ok {
        Ok(())
    } else {
        Err(PrefsError::Other("write was rejected by the database".to_string()))
    }
}

fn render(value: &StoredValue) -> String {
    match value {
        StoredValue::Text(text) => text.clone(),
        StoredValue::Set(members) => {
            let items: Vec<&str> = members.iter().map(String::as_str).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

fn parse_as<T: std::str::FromStr>(key: &str, value: &str, expected: &'static str) -> Result<T, PrefsError> {
    value.parse().map_err(|_| PrefsError::TypeMismatch {
        key: key.to_string(),
        expected,
    })
}

// ─── Reads ───────────────────────────────────────────────────────────────────

fn cmd_get(config: &Config, name: &str, key: &str, kind: ValueKind) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;

    if !store.contains(key) {
        println!("Preference not found: {}", key);
        return Ok(());
    }

    let shown = match kind {
        ValueKind::String => store.get_string(key, None)?.unwrap_or_default(),
        ValueKind::Int => store.get_int(key, 0)?.to_string(),
        ValueKind::Long => store.get_long(key, 0)?.to_string(),
        ValueKind::Float => store.get_float(key, 0.0)?.to_string(),
        ValueKind::Bool => store.get_boolean(key, false)?.to_string(),
        ValueKind::Set => render(&StoredValue::Set(
            store.get_string_set(key, None)?.unwrap_or_default(),
        )),
    };
    println!("{}", shown);
    Ok(())
}

fn cmd_contains(config: &Config, name: &str, key: &str) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    println!("{}", store.contains(key));
    Ok(())
}

fn cmd_list(config: &Config, name: &str) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    let all = store.get_all();

    if all.is_empty() {
        println!("No preferences stored in '{}'.", name);
        return Ok(());
    }

    let width = all.keys().map(|k| k.len()).max().unwrap_or(0).max(3);
    println!("{:<width$}  VALUE", "KEY", width = width);
    println!("{:-<1$}", "", width + 40);
    for (key, value) in &all {
        println!("{:<width$}  {}", key, render(value), width = width);
    }
    println!("\n{} preference(s)", all.len());
    Ok(())
}

fn cmd_raw(config: &Config, name: &str) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    let raw = store.substrate().get_all();

    println!("Sealed contents of '{}' ({} slot(s)):", name, raw.len());
    for (key, value) in &raw {
        println!("{}\n  => {}", key, render(value));
    }
    Ok(())
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn cmd_put(
    config: &Config,
    name: &str,
    key: &str,
    value: &str,
    kind: ValueKind,
    apply: bool,
) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    let editor = store.edit();

    let editor = match kind {
        ValueKind::String => editor.put_string(key, value)?,
        ValueKind::Int => editor.put_int(key, parse_as(key, value, "int")?)?,
        ValueKind::Long => editor.put_long(key, parse_as(key, value, "long")?)?,
        ValueKind::Float => editor.put_float(key, parse_as(key, value, "float")?)?,
        ValueKind::Bool => editor.put_boolean(key, parse_as(key, value, "boolean")?)?,
        ValueKind::Set => editor.put_string_set(key, BTreeSet::from([value.to_string()]))?,
    };

    if apply {
        editor.apply();
    } else {
        committed(editor.commit())?;
    }

    println!("✓ Stored '{}' in '{}'", key, name);
    Ok(())
}

fn cmd_put_set(config: &Config, name: &str, key: &str, values: Vec<String>) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    let members: BTreeSet<String> = values.into_iter().collect();
    let count = members.len();

    committed(store.edit().put_string_set(key, members)?.commit())?;
    println!("✓ Stored '{}' ({} member(s)) in '{}'", key, count, name);
    Ok(())
}

fn cmd_remove(config: &Config, name: &str, key: &str) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;

    if !store.contains(key) {
        println!("Preference not found: {}", key);
        return Ok(());
    }

    committed(store.edit().remove(key).commit())?;
    println!("✓ Removed '{}' from '{}'", key, name);
    Ok(())
}

fn cmd_clear(config: &Config, name: &str) -> Result<(), PrefsError> {
    let store = open_store(config, name)?;
    let count = store.len();

    committed(store.edit().clear().commit())?;
    println!("✓ Cleared {} preference(s) from '{}'", count, name);
    Ok(())
}

fn cmd_delete_key(config: &Config, name: &str, yes: bool) -> Result<(), PrefsError> {
    if !yes {
        println!(
            "Refusing to delete the key for '{}' without --yes: every value in the store would become unreadable.",
            name
        );
        return Ok(());
    }

    let provisioner = config.provisioner()?;
    if !provisioner.has_key(name)? {
        println!("No key exists for '{}'", name);
        return Ok(());
    }

    provisioner.delete_key(name)?;
    println!("✓ Deleted key for '{}'. Existing values in this store are now unrecoverable.", name);
    Ok(())
}
