use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};
use uuid::Uuid;

use crate::device::constants::{CONNECT_DEADLINE, IS_CONNECTED_DEADLINE, SCAN_DURATION, SCAN_POLL_DELAY, WRITE_DEADLINE};
use crate::device::transport::{DiscoveredService, NotificationStream, Transport};
use crate::device::types::{DeviceFilter, DeviceIdentity};
use crate::error::TransportError;

/// [`Transport`] backed by the platform bluetooth stack.
///
/// There is no chooser dialog: `request_device` scans for a while and picks the first peripheral
/// matching the filter.
pub struct BtleTransport {
    adapters: Vec<Adapter>,
    // peripherals found by request_device, by identity id
    peripherals: Mutex<HashMap<String, Peripheral>>,
}

// Some platforms (macOS) hide the address; fall back to the platform id there.
fn identity_id(peripheral: &Peripheral) -> String {
    let address = peripheral.address();
    if address.into_inner() == [0; 6] {
        format!("{:?}", peripheral.id())
    } else {
        address.to_string()
    }
}

async fn stop_scan(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

impl BtleTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        if adapters.is_empty() {
            return Err(TransportError::Link("No bluetooth adapter found".to_string()));
        }

        for adapter in &adapters {
            info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        }

        Ok(BtleTransport { adapters, peripherals: Mutex::new(HashMap::new()) })
    }

    async fn find_peripheral(&self, filter: &DeviceFilter) -> Option<(DeviceIdentity, Peripheral)> {
        for adapter in &self.adapters {
            let peripherals = match adapter.peripherals().await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to query BLE adapter for peripherals: {}", err);
                    continue;
                },
            };

            for peripheral in peripherals {
                let properties = match peripheral.properties().await {
                    Ok(Some(properties)) => properties,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!("Could not query peripheral for properties: {:?}", err);
                        continue;
                    },
                };

                let id = identity_id(&peripheral);
                let name = properties.local_name.unwrap_or_default();

                if filter.matches_advertisement(&id, &name, &properties.services) {
                    info!("Using peripheral {} {} {:?}", id, name, properties.services);
                    return Some((DeviceIdentity::new(id, name), peripheral));
                }
            }
        }

        None
    }

    fn peripheral(&self, identity: &DeviceIdentity) -> Option<Peripheral> {
        let peripherals = self.peripherals.lock().unwrap_or_else(PoisonError::into_inner);
        peripherals.get(&identity.id).cloned()
    }
}

impl Transport for BtleTransport {
    type Link = Peripheral;
    type Characteristic = Characteristic;

    async fn request_device(&self, filter: &DeviceFilter) -> Result<DeviceIdentity, TransportError> {
        // shades do not always advertise their service, so scan unfiltered and match by name
        for (index, adapter) in self.adapters.iter().enumerate() {
            if let Err(err) = adapter.start_scan(ScanFilter::default()).await {
                stop_scan(&self.adapters[..index]).await;
                return Err(err.into());
            }
        }

        let deadline = Instant::now() + Duration::from_millis(SCAN_DURATION);
        let mut found = None;

        while Instant::now() < deadline {
            found = self.find_peripheral(filter).await;
            if found.is_some() {
                break;
            }
            debug!("No peripherals matched");
            sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
        }

        stop_scan(&self.adapters).await;

        let (identity, peripheral) = found.ok_or(TransportError::NoDeviceSelected)?;
        self.peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.id.clone(), peripheral);

        Ok(identity)
    }

    async fn connect(&self, identity: &DeviceIdentity) -> Result<Peripheral, TransportError> {
        let peripheral = match self.peripheral(identity) {
            Some(peripheral) => peripheral,
            None => return Err(TransportError::Link(format!("{} has not been found by a scan", identity))),
        };

        tokio::select! {
            _ = sleep(Duration::from_millis(CONNECT_DEADLINE)) => {
                Err(TransportError::Link("Connecting took too long".to_string()))
            }
            result = peripheral.connect() => {
                result?;
                Ok(peripheral.clone())
            }
        }
    }

    async fn discover_services(&self, link: &Peripheral) -> Result<Vec<DiscoveredService>, TransportError> {
        link.discover_services().await?;

        Ok(link.services()
            .into_iter()
            .map(|service| DiscoveredService {
                uuid: service.uuid,
                characteristics: service.characteristics.iter().map(|c| c.uuid).collect(),
            })
            .collect())
    }

    async fn get_writable_characteristic(
        &self,
        link: &Peripheral,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, TransportError> {
        link.services()
            .iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.uuid == characteristic)
            .cloned()
            .ok_or(TransportError::ServiceNotFound { service, characteristic })
    }

    async fn subscribe(&self, link: &Peripheral, characteristic: &Characteristic) -> Result<NotificationStream, TransportError> {
        info!("Subscribing to characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        link.subscribe(characteristic).await?;

        let uuid = characteristic.uuid;
        let notifications = link.notifications().await?;
        Ok(Box::pin(notifications.filter_map(move |data| {
            futures::future::ready(if data.uuid == uuid { Some(data.value) } else { None })
        })))
    }

    async fn write(&self, link: &Peripheral, characteristic: &Characteristic, bytes: &[u8]) -> Result<(), TransportError> {
        let fut = link.write(characteristic, bytes, WriteType::WithResponse);

        tokio::select! {
            _ = sleep(Duration::from_millis(WRITE_DEADLINE)) => {
                Err(TransportError::Write("Sending to data characteristic took too long".to_string()))
            }
            result = fut => {
                result.map_err(|err| TransportError::Write(err.to_string()))
            }
        }
    }

    async fn is_linked(&self, link: &Peripheral) -> bool {
        tokio::select! {
            _ = sleep(Duration::from_millis(IS_CONNECTED_DEADLINE)) => {
                warn!("Checking for connection status took too long");
                false
            }
            result = link.is_connected() => match result {
                Err(err) => {
                    warn!("Error checking for connection state: {:?}", err);
                    false
                },
                Ok(connected) => connected,
            }
        }
    }

    async fn close(&self, link: &Peripheral) {
        if let Err(err) = link.disconnect().await {
            warn!("Failed to disconnect peripheral: {:?}", err);
        }
    }
}
