use anyhow::{Context, Result};
use keyring::Entry;

use crate::config::APP_NAME;

pub struct CredentialStore;

impl CredentialStore {
    /// Store the bearer credential for an account in the OS keychain
    pub fn store(account: &str, token: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, account).context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store credential in keychain")?;
        Ok(())
    }

    /// Retrieve the bearer credential for an account
    pub fn get(account: &str) -> Result<String> {
        let entry = Entry::new(APP_NAME, account).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve credential from keychain")
    }

    /// Delete the stored credential (sign-out)
    pub fn delete(account: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, account).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }
}
