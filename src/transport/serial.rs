// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Serial port medium
//!
//! The `serialport` API is blocking, so every call runs on the blocking
//! thread pool with the port shared behind a mutex.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{Medium, MediumKind, QueueDirection, RestartPolicy, TransportError};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

const READABLE_POLL: Duration = Duration::from_millis(10);

pub struct SerialMedium {
    device: String,
    baud_rate: u32,
    port: Option<SharedPort>,
    policy: RestartPolicy,
}

impl SerialMedium {
    pub fn new(device: &str, baud_rate: u32, policy: RestartPolicy) -> Self {
        Self {
            device: device.to_string(),
            baud_rate,
            port: None,
            policy,
        }
    }

    fn port(&self) -> Result<SharedPort, TransportError> {
        self.port.clone().ok_or(TransportError::NotOpen)
    }

    /// Run a blocking closure against the locked port.
    async fn with_port<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn SerialPort>) -> Result<T, TransportError> + Send + 'static,
    {
        let port = self.port()?;
        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock().map_err(|_| TransportError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| TransportError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Medium for SerialMedium {
    async fn open(&mut self) -> Result<(), TransportError> {
        let device = self.device.clone();
        let baud_rate = self.baud_rate;
        let port = tokio::task::spawn_blocking(move || {
            serialport::new(&device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(100))
                .open()
        })
        .await
        .map_err(|e| TransportError::Task(e.to_string()))??;

        port.clear(ClearBuffer::All)?;
        self.port = Some(Arc::new(Mutex::new(port)));
        tokio::time::sleep(Duration::from_millis(1)).await;

        info!("Opened serial port {} at {} baud", self.device, self.baud_rate);
        Ok(())
    }

    async fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        let expected = buf.len();
        let deadline = Instant::now() + timeout;

        let data = self
            .with_port(move |port| {
                let mut out = vec![0u8; expected];
                let mut received = 0;
                while received < expected {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TransportError::Timeout { expected, received });
                    }
                    port.set_timeout(deadline - now)?;
                    match port.read(&mut out[received..]) {
                        Ok(n) => received += n,
                        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(out)
            })
            .await?;

        buf.copy_from_slice(&data);
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let bytes = data.to_vec();
        let len = bytes.len();
        self.with_port(move |port| {
            port.write_all(&bytes)?;
            Ok(len)
        })
        .await
    }

    async fn flush(&mut self, direction: QueueDirection) -> Result<(), TransportError> {
        let which = match direction {
            QueueDirection::Input => ClearBuffer::Input,
            QueueDirection::Output => ClearBuffer::Output,
            QueueDirection::Both => ClearBuffer::All,
        };
        self.with_port(move |port| Ok(port.clear(which)?)).await
    }

    async fn drain(&mut self) -> Result<(), TransportError> {
        self.with_port(|port| Ok(port.flush()?)).await
    }

    async fn restart(&mut self) -> Result<(), TransportError> {
        warn!("Restarting serial port {}", self.device);
        self.close().await;

        while self.policy.keep_trying() {
            match self.open().await {
                Ok(()) => {
                    info!("Serial port {} reopened", self.device);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Reopening {} failed ({}), retrying in {:?}",
                        self.device,
                        e,
                        self.policy.delay()
                    );
                    self.policy.pause().await;
                }
            }
        }
        Err(TransportError::ShuttingDown)
    }

    async fn readable(&mut self) -> Result<(), TransportError> {
        loop {
            let pending = self.with_port(|port| Ok(port.bytes_to_read()?)).await?;
            if pending > 0 {
                return Ok(());
            }
            tokio::time::sleep(READABLE_POLL).await;
        }
    }

    async fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.device);
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn kind(&self) -> MediumKind {
        MediumKind::Serial
    }

    fn describe(&self) -> String {
        format!("serial {} @ {}", self.device, self.baud_rate)
    }
}
