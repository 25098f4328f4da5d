//! Codec registry
//!
//! Owns every codec instance and the protocol-id map that routes decoding
//! between them. All writes happen during startup (`register`,
//! `instantiate_all`) and teardown (`release_all`); packet processing only
//! reads, so worker threads share the registry by plain reference.

use tracing::{debug, info, warn};

use super::stats::{CodecStats, GlobalStats, StatRow, MAX_CODECS, STAT_NAMES, STAT_OFFSET};
use super::{Codec, CodecApi};
use crate::error::RegistryError;
use crate::thread::ThreadCtx;

const PROTO_MAP_SIZE: usize = 65536;

/// Registry of codec apis, live instances, and the protocol-id map.
pub struct CodecRegistry {
    apis: Vec<CodecApi>,
    default_api: Option<CodecApi>,
    codecs: Vec<Option<Box<dyn Codec>>>,
    proto_map: Vec<u8>,
    count: u8,
    stats: GlobalStats,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut codecs = Vec::with_capacity(MAX_CODECS);
        codecs.resize_with(MAX_CODECS, || None);
        Self {
            apis: Vec::new(),
            default_api: None,
            codecs,
            proto_map: vec![0; PROTO_MAP_SIZE],
            count: 0,
            stats: GlobalStats::new(),
        }
    }

    /// Append a codec descriptor. Both lifecycle endpoints are mandatory.
    pub fn register(&mut self, api: CodecApi) -> Result<(), RegistryError> {
        validate_api(&api)?;
        self.apis.push(api);
        Ok(())
    }

    /// Construct every registered codec and build the protocol-id map.
    ///
    /// `default_api` is bound to index 0 and serves as the link-layer
    /// entry point; registered codecs get indices 1..=254 in registration
    /// order. A protocol id claimed twice is warned about and resolves to
    /// the newer registration.
    pub fn instantiate_all(&mut self, default_api: CodecApi) -> Result<(), RegistryError> {
        validate_api(&default_api)?;

        if self.apis.len() >= MAX_CODECS - 1 {
            return Err(RegistryError::TooManyCodecs);
        }

        if let Some(pinit) = default_api.pinit {
            pinit();
        }
        let default_cd = (default_api.ctor.expect("ctor checked at registration"))();
        self.check_name(default_cd.name())?;
        self.codecs[0] = Some(default_cd);
        self.default_api = Some(default_api);

        let mut ids = Vec::new();
        for i in 0..self.apis.len() {
            let api = self.apis[i];
            let index = (i + 1) as u8;

            if let Some(pinit) = api.pinit {
                pinit();
            }
            let cd = (api.ctor.expect("ctor checked at registration"))();
            self.check_name(cd.name())?;

            ids.clear();
            cd.protocol_ids(&mut ids);
            for &id in &ids {
                let prev = self.proto_map[id as usize];
                if prev != 0 {
                    warn!(
                        "codecs {} and {} both registered for protocol id {}; {} will be used",
                        self.codecs[prev as usize]
                            .as_ref()
                            .map(|c| c.name())
                            .unwrap_or("?"),
                        cd.name(),
                        id,
                        cd.name()
                    );
                }
                self.proto_map[id as usize] = index;
            }

            debug!("bound codec {} at index {}", cd.name(), index);
            self.codecs[index as usize] = Some(cd);
            self.count = index;
        }

        info!("instantiated {} codecs", self.count as usize + 1);
        Ok(())
    }

    /// Tear everything down: process-term hooks, then destructors.
    pub fn release_all(&mut self) {
        if let Some(api) = self.default_api.take() {
            if let Some(pterm) = api.pterm {
                pterm();
            }
            if let Some(cd) = self.codecs[0].take() {
                (api.dtor.expect("dtor checked at registration"))(cd);
            }
        }

        for (i, api) in self.apis.iter().enumerate() {
            if let Some(pterm) = api.pterm {
                pterm();
            }
            if let Some(cd) = self.codecs[i + 1].take() {
                (api.dtor.expect("dtor checked at registration"))(cd);
            }
        }

        self.apis.clear();
        self.proto_map.iter_mut().for_each(|e| *e = 0);
        self.count = 0;
    }

    /// Run per-thread init hooks, bind the thread's grinder to the codec
    /// matching the capture source's base link type, and seed its IP-id
    /// pool.
    pub fn thread_init(&self, base_dlt: i32, thread: &mut ThreadCtx) -> Result<(), RegistryError> {
        if self.default_api.is_none() {
            return Err(RegistryError::NotInstantiated);
        }

        for api in self.default_api.iter().chain(self.apis.iter()) {
            if let Some(tinit) = api.tinit {
                tinit();
            }
        }

        let mut grinder: Option<u8> = None;
        let mut dlts = Vec::new();
        for index in 0..=self.count as usize {
            let Some(cd) = self.codecs[index].as_ref() else {
                continue;
            };
            dlts.clear();
            cd.data_link_types(&mut dlts);
            if dlts.contains(&base_dlt) {
                if let Some(prev) = grinder {
                    warn!(
                        "codecs {} and {} both claim data link type {}; {} will be used",
                        self.codecs[prev as usize]
                            .as_ref()
                            .map(|c| c.name())
                            .unwrap_or("?"),
                        cd.name(),
                        base_dlt,
                        cd.name()
                    );
                }
                grinder = Some(index as u8);
            }
        }

        let grinder = grinder.ok_or(RegistryError::NoGrinder(base_dlt))?;
        info!(
            "decoding with {}",
            self.codecs[grinder as usize]
                .as_ref()
                .map(|c| c.name())
                .unwrap_or("?")
        );

        thread.grinder = grinder;
        thread.reseed_ip_ids();
        Ok(())
    }

    /// Flush the thread's counters into the global accumulator and run
    /// per-thread term hooks.
    pub fn thread_term(&self, thread: &mut ThreadCtx) {
        self.stats.accumulate(&thread.stats);
        thread.stats.reset();

        for api in self.default_api.iter().chain(self.apis.iter()) {
            if let Some(tterm) = api.tterm {
                tterm();
            }
        }
    }

    /// Codec bound at `index`, if any.
    pub fn codec(&self, index: u8) -> Option<&dyn Codec> {
        self.codecs[index as usize].as_deref()
    }

    pub fn has_codec(&self, index: u8) -> bool {
        self.codecs[index as usize].is_some()
    }

    /// Codec index owning `prot_id`; 0 when unmapped.
    pub fn map(&self, prot_id: u16) -> u8 {
        self.proto_map[prot_id as usize]
    }

    /// Number of registered codecs, excluding the default slot.
    pub fn codec_count(&self) -> u8 {
        self.count
    }

    /// Fold one local counter array into the global totals without going
    /// through `thread_term`.
    pub fn accumulate_stats(&self, local: &CodecStats) {
        self.stats.accumulate(local);
    }

    pub fn global_stats(&self) -> &GlobalStats {
        &self.stats
    }

    /// The labeled counter table: `total`, `other`, `discards`, then one
    /// row per bound codec.
    pub fn stats_table(&self) -> Vec<StatRow> {
        let raw = self.stats.raw();
        let mut rows: Vec<StatRow> = STAT_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| StatRow {
                name: (*name).to_string(),
                count: raw[i],
            })
            .collect();

        for index in 0..=self.count as usize {
            if let Some(cd) = self.codecs[index].as_ref() {
                rows.push(StatRow {
                    name: cd.name().to_string(),
                    count: raw[STAT_OFFSET + index],
                });
            }
        }
        rows
    }

    /// Log the counter table.
    pub fn dump_stats(&self) {
        for row in self.stats_table() {
            info!(name = %row.name, count = row.count, "codec stats");
        }
    }

    fn check_name(&self, name: &str) -> Result<(), RegistryError> {
        for cd in self.codecs.iter().flatten() {
            if cd.name().eq_ignore_ascii_case(name) {
                return Err(RegistryError::DuplicateName(name.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_api(api: &CodecApi) -> Result<(), RegistryError> {
    if api.ctor.is_none() {
        return Err(RegistryError::MissingCtor(api.name));
    }
    if api.dtor.is_none() {
        return Err(RegistryError::MissingDtor(api.name));
    }
    Ok(())
}
