//! NVS (Non-Volatile Storage) bring-up.
//!
//! The Wi-Fi driver keeps its calibration data in the default NVS partition,
//! so the partition must be usable before the access point starts.

use anyhow::Result;
use camserve_core::startup::init_with_erase_retry;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::{esp, nvs_flash_erase, nvs_flash_init};
use log::info;

/// Initialize the default NVS partition and take a handle to it.
///
/// A failed first init (no free pages, newer layout version, corruption)
/// erases the partition and initializes once more; a second failure is
/// returned.
pub fn init_nvs() -> Result<EspDefaultNvsPartition> {
    init_with_erase_retry(
        || esp!(unsafe { nvs_flash_init() }),
        || esp!(unsafe { nvs_flash_erase() }),
    )?;

    let partition = EspDefaultNvsPartition::take()?;
    info!("NVS ready");
    Ok(partition)
}
