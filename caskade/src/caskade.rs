//! `Caskade`: a directory of casks, the in-memory index built by replay, and
//! the lifecycle state machine (open → writable ⇄ paused → closed).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::buffer::FileBytes;
use crate::config::{CaskadeConfig, HasherSigner, Signer, SignerKind};
use crate::error::CaskadeError;
use crate::file::CaskFile;
use crate::fs::{ConcreteSystem, FileSystem};
use crate::hashing::HashKey;
use crate::ids::{Cake, CaskId, Rake, RAKE_TYPE_CASKADE};
use crate::model::{CheckPoint, DataLocation, ReplayState, VALIDATE_ALL, VALIDATE_NONE};
use crate::packer::{pack_adjsize4, NanoTime};
use crate::record::{CheckPointType, Stamp};

const CONFIG_NAME: &str = "config.json";
const KEY_NAME: &str = "key.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Writable,
    Paused,
    Closed,
    NeedsRecover,
}

/// A directory-backed append log. Generic over the filesystem so tests can
/// run against [`crate::test::TestFileSystem`] instead of real files.
pub struct Caskade<T: FileSystem> {
    fs: T,
    pub caskade_id: Rake,
    pub config: CaskadeConfig,
    mode: Mode,
    active: Option<CaskFile>,
    /// Every cask this process has ever seen, by id, mapped to its current
    /// on-disk name (suffix may be `.active` or `.cask`).
    known_casks: HashMap<CaskId, String>,
    last_cask_id: Option<CaskId>,
    /// Stashed while paused, so `resume` doesn't need to re-replay the file.
    paused_file: Option<CaskFile>,
    pub data_locations: HashMap<HashKey, DataLocation>,
    pub datalinks: HashMap<Rake, HashMap<u8, HashKey>>,
    pub check_points: Vec<CheckPoint>,
}

fn parse_cask_name(name: &str) -> Option<(CaskId, bool)> {
    if let Some(stem) = name.strip_suffix(".active") {
        CaskId::from_file_stem(stem).map(|id| (id, true))
    } else if let Some(stem) = name.strip_suffix(".cask") {
        CaskId::from_file_stem(stem).map(|id| (id, false))
    } else {
        None
    }
}

impl Caskade<ConcreteSystem> {
    /// Opens (or creates) a caskade at a real directory.
    pub fn open(path: impl Into<PathBuf>, config: Option<CaskadeConfig>) -> Result<Self, CaskadeError> {
        let fs = ConcreteSystem::init(path)?;
        Caskade::open_with_fs(fs, config)
    }
}

impl<T: FileSystem> Caskade<T> {
    #[instrument(skip(fs, config))]
    pub fn open_with_fs(mut fs: T, config: Option<CaskadeConfig>) -> Result<Caskade<T>, CaskadeError> {
        match fs.read_meta(CONFIG_NAME)? {
            Some(bytes) => Self::reopen(fs, &bytes),
            None => Self::create(fs, config),
        }
    }

    fn create(mut fs: T, config: Option<CaskadeConfig>) -> Result<Caskade<T>, CaskadeError> {
        let caskade_id = Rake::build_new(RAKE_TYPE_CASKADE).map_err(CaskadeError::Config)?;
        let mut config = config.unwrap_or_else(|| CaskadeConfig::new(caskade_id));
        config.origin = caskade_id;
        config.validate_config()?;

        if let Some(kind) = config.signer_kind {
            let secret = random_secret();
            fs.write_meta(KEY_NAME, &secret)?;
            config.signer = Some(build_signer(kind, secret));
        }

        let serialized = serde_json::to_vec_pretty(&config)
            .map_err(|e| CaskadeError::Config(e.to_string()))?;
        fs.write_meta(CONFIG_NAME, &serialized)?;

        let (file, virtual_cp) = CaskFile::create_bootstrap(&mut fs, caskade_id)?;
        info!(caskade_id = %caskade_id, "created new caskade");

        let mut known_casks = HashMap::new();
        known_casks.insert(file.cask_id, file.name.clone());

        Ok(Caskade {
            fs,
            caskade_id,
            config,
            mode: Mode::Writable,
            last_cask_id: Some(file.cask_id),
            active: Some(file),
            known_casks,
            paused_file: None,
            data_locations: HashMap::new(),
            datalinks: HashMap::new(),
            check_points: vec![virtual_cp],
        })
    }

    fn reopen(mut fs: T, config_bytes: &[u8]) -> Result<Caskade<T>, CaskadeError> {
        let mut config: CaskadeConfig =
            serde_json::from_slice(config_bytes).map_err(|e| CaskadeError::Config(e.to_string()))?;
        if let Some(kind) = config.signer_kind {
            let secret = fs
                .read_meta(KEY_NAME)?
                .ok_or_else(|| CaskadeError::Config("missing key.bin for configured signer".to_owned()))?;
            config.signer = Some(build_signer(kind, secret));
        }
        let caskade_id = config.origin;

        let mut names: Vec<(CaskId, String)> = fs
            .list_names()?
            .into_iter()
            .filter_map(|name| parse_cask_name(&name).map(|(id, _)| (id, name)))
            .filter(|(id, _)| id.caskade_id == caskade_id)
            .collect();
        names.sort_by_key(|(id, _)| id.idx);

        let mut state = ReplayState::new();
        let mut known_casks = HashMap::new();
        let mut last_file: Option<CaskFile> = None;
        for (id, name) in &names {
            let file = CaskFile::read_file(&mut fs, name, *id, &config, VALIDATE_NONE, &mut state)?;
            known_casks.insert(*id, name.clone());
            last_file = Some(file);
        }

        let last_cask_id = names.last().map(|(id, _)| *id);
        let last_cp_type = state.check_points.last().map(|cp| cp.cp_type);

        debug!(?last_cp_type, "reopened caskade, determining writability");

        let (mode, active, paused_file) = match last_cp_type {
            Some(CheckPointType::OnCaskadeClose) => (Mode::Closed, None, None),
            Some(CheckPointType::OnCaskadePause) => (Mode::Paused, None, last_file),
            _ => (Mode::NeedsRecover, None, None),
        };

        Ok(Caskade {
            fs,
            caskade_id,
            config,
            mode,
            active,
            known_casks,
            last_cask_id,
            paused_file,
            data_locations: state.data_locations,
            datalinks: state.datalinks,
            check_points: state.check_points,
        })
    }

    fn assert_writable(&self) -> Result<(), CaskadeError> {
        if self.mode == Mode::Writable && self.active.is_some() {
            Ok(())
        } else {
            Err(CaskadeError::Access(format!("not writable: {:?}", self.mode)))
        }
    }

    fn ensure_capacity(&mut self, next_entry_size: u64) -> Result<(), CaskadeError> {
        let now = NanoTime::now();
        let spill = self
            .active
            .as_ref()
            .expect("checked by assert_writable")
            .will_it_spill(&self.config, now, next_entry_size);
        match spill {
            None => Ok(()),
            Some(CheckPointType::OnNextCask) => self.do_rollover(),
            Some(cp_type) => {
                let cp = self.active.as_mut().unwrap().write_checkpoint(
                    &mut self.fs,
                    &self.config,
                    cp_type,
                )?;
                self.check_points.push(cp);
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    fn do_rollover(&mut self) -> Result<(), CaskadeError> {
        let active = self.active.as_mut().expect("checked by assert_writable");
        let next_id = active.cask_id.next();
        let next_cake = Cake::cask(HashKey::of(&next_id.to_bytes()));
        active.write_next_cask(&mut self.fs, next_cake)?;
        let terminal = active.write_checkpoint(&mut self.fs, &self.config, CheckPointType::OnNextCask)?;
        active.seal(&mut self.fs)?;
        self.known_casks.insert(active.cask_id, active.name.clone());
        self.check_points.push(terminal.clone());

        let prev = self.active.take().unwrap();
        let (next_file, virtual_cp) = CaskFile::create_successor(&mut self.fs, &prev, &terminal)?;
        self.known_casks.insert(next_file.cask_id, next_file.name.clone());
        self.last_cask_id = Some(next_file.cask_id);
        self.check_points.push(virtual_cp);
        self.active = Some(next_file);
        info!(new_cask = %next_id.file_stem(), "rolled over to new cask");
        Ok(())
    }

    /// Writes `bytes` and returns their content hash. Idempotent unless
    /// `force` is set: a previously written identical blob is not
    /// re-appended.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn write_bytes(&mut self, bytes: &[u8], force: bool) -> Result<HashKey, CaskadeError> {
        self.assert_writable()?;
        let hash = HashKey::of(bytes);
        if !force && self.data_locations.contains_key(&hash) {
            return Ok(hash);
        }

        let record_len =
            Stamp::LEN + HashKey::LEN + pack_adjsize4(bytes.len()).len() + bytes.len();
        self.ensure_capacity(record_len as u64)?;

        let active = self.active.as_mut().expect("checked by assert_writable");
        let (offset, size) = active.write_data(&mut self.fs, hash, bytes)?;
        self.data_locations.insert(
            hash,
            DataLocation {
                cask_id: active.cask_id,
                offset: offset as usize,
                size,
            },
        );
        Ok(hash)
    }

    /// Points `anchor`'s `purpose` slot at `target`. Returns `false` (and
    /// writes nothing) if it already points there.
    #[instrument(skip(self))]
    pub fn set_link(&mut self, anchor: Rake, purpose: u8, target: HashKey) -> Result<bool, CaskadeError> {
        self.assert_writable()?;
        if self
            .datalinks
            .get(&anchor)
            .and_then(|slots| slots.get(&purpose))
            .is_some_and(|current| *current == target)
        {
            return Ok(false);
        }

        let header_len = 16 + 1 + Cake::LEN;
        self.ensure_capacity((Stamp::LEN + header_len) as u64)?;

        let active = self.active.as_mut().expect("checked by assert_writable");
        active.write_link(&mut self.fs, anchor, purpose, Cake::data(target))?;
        self.datalinks.entry(anchor).or_default().insert(purpose, target);
        Ok(true)
    }

    /// Writes a manual checkpoint unconditionally, even if no bytes have
    /// been written since the last one.
    #[instrument(skip(self))]
    pub fn checkpoint(&mut self) -> Result<(), CaskadeError> {
        self.assert_writable()?;
        let cp = self.active.as_mut().unwrap().write_checkpoint(
            &mut self.fs,
            &self.config,
            CheckPointType::Manual,
        )?;
        self.check_points.push(cp);
        Ok(())
    }

    /// Seals a final checkpoint and drops the active handle; writes are
    /// rejected until [`Caskade::resume`].
    #[instrument(skip(self))]
    pub fn pause(&mut self) -> Result<(), CaskadeError> {
        self.assert_writable()?;
        let cp = self.active.as_mut().unwrap().write_checkpoint(
            &mut self.fs,
            &self.config,
            CheckPointType::OnCaskadePause,
        )?;
        self.check_points.push(cp);
        self.paused_file = self.active.take();
        self.mode = Mode::Paused;
        Ok(())
    }

    /// Resumes writing after [`Caskade::pause`]. Requires the last
    /// checkpoint to be `ON_CASKADE_PAUSE`.
    #[instrument(skip(self))]
    pub fn resume(&mut self) -> Result<(), CaskadeError> {
        if self.mode != Mode::Paused {
            return Err(CaskadeError::Access("caskade is not paused".to_owned()));
        }
        let last = self
            .check_points
            .last()
            .ok_or_else(|| CaskadeError::Format("no checkpoints recorded".to_owned()))?;
        if last.cp_type != CheckPointType::OnCaskadePause {
            return Err(CaskadeError::Format(
                "last checkpoint is not ON_CASKADE_PAUSE".to_owned(),
            ));
        }

        let mut file = self
            .paused_file
            .take()
            .ok_or_else(|| CaskadeError::Format("no stashed cask to resume".to_owned()))?;
        let cp = file.write_checkpoint(&mut self.fs, &self.config, CheckPointType::OnCaskadeResume)?;
        self.check_points.push(cp);
        self.active = Some(file);
        self.mode = Mode::Writable;
        Ok(())
    }

    /// Recovers from an unclean shutdown: re-validates the tail cask,
    /// appends an `ON_CASKADE_RECOVER` checkpoint, and becomes writable.
    /// `quiet_seconds`, if given, first confirms the tail file's length is
    /// stable (no concurrent writer) before proceeding.
    #[instrument(skip(self))]
    pub fn recover(&mut self, quiet_seconds: Option<u64>) -> Result<(), CaskadeError> {
        if self.mode != Mode::NeedsRecover {
            return Err(CaskadeError::Access("caskade does not need recovery".to_owned()));
        }
        let cask_id = self
            .last_cask_id
            .ok_or_else(|| CaskadeError::Format("no casks found to recover".to_owned()))?;
        let name = self
            .known_casks
            .get(&cask_id)
            .ok_or_else(|| CaskadeError::Format("unknown tail cask".to_owned()))?
            .clone();

        if let Some(quiet) = quiet_seconds {
            let fd = self.fs.open_existing(&name)?;
            let before = self.fs.file_size(fd)?;
            if quiet > 0 {
                std::thread::sleep(Duration::from_secs(quiet));
            }
            let after = self.fs.file_size(fd)?;
            if after != before {
                warn!(before, after, "tail cask grew during quiet period");
                return Err(CaskadeError::NotQuiet);
            }
        }

        let mut scratch = ReplayState::new();
        let file = CaskFile::read_file(&mut self.fs, &name, cask_id, &self.config, VALIDATE_ALL, &mut scratch)?;

        let mut file = file;
        let cp = file.write_checkpoint(&mut self.fs, &self.config, CheckPointType::OnCaskadeRecover)?;
        self.check_points.push(cp);
        self.active = Some(file);
        self.mode = Mode::Writable;
        info!(cask = %cask_id.file_stem(), "recovered caskade");
        Ok(())
    }

    /// Writes the terminal `NEXT_CASK(NULL) + ON_CASKADE_CLOSE` sequence.
    /// Further writes are rejected, by this instance and by any freshly
    /// opened one.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), CaskadeError> {
        self.assert_writable()?;
        let active = self.active.as_mut().unwrap();
        active.write_next_cask(&mut self.fs, Cake::NULL)?;
        let cp = active.write_checkpoint(&mut self.fs, &self.config, CheckPointType::OnCaskadeClose)?;
        active.seal(&mut self.fs)?;
        self.known_casks.insert(active.cask_id, active.name.clone());
        self.check_points.push(cp);
        self.active = None;
        self.mode = Mode::Closed;
        Ok(())
    }

    pub fn contains(&self, hash: &HashKey) -> bool {
        self.data_locations.contains_key(hash)
    }

    /// Fetches the bytes of a previously written blob by its hash.
    pub fn read_bytes(&mut self, hash: &HashKey) -> Result<Vec<u8>, CaskadeError> {
        let loc = *self
            .data_locations
            .get(hash)
            .ok_or_else(|| CaskadeError::NotFound(hash.to_string()))?;
        self.fragment_from(loc.cask_id, loc.offset as u64, loc.size)
    }

    fn fragment_from(&mut self, cask_id: CaskId, offset: u64, size: usize) -> Result<Vec<u8>, CaskadeError> {
        if let Some(active) = &self.active {
            if active.cask_id == cask_id {
                return active.fragment(&self.fs, offset, size);
            }
        }
        let name = self
            .known_casks
            .get(&cask_id)
            .ok_or_else(|| CaskadeError::NotFound(format!("{cask_id:?}")))?
            .clone();
        let fd = self.fs.open_existing(&name)?;
        let mut pager = FileBytes::new(&self.fs, fd);
        Ok(pager.read(offset, size)?)
    }

    /// The currently active (writable) cask's id, if any.
    pub fn active_cask_id(&self) -> Option<CaskId> {
        self.active.as_ref().map(|f| f.cask_id)
    }

    /// Reclaims the underlying filesystem, e.g. to reopen an in-memory
    /// [`crate::test::TestFileSystem`] against a fresh `Caskade` in tests.
    pub fn into_fs(self) -> T {
        self.fs
    }
}

fn random_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn build_signer(kind: SignerKind, secret: Vec<u8>) -> Arc<dyn Signer + Send + Sync> {
    match kind {
        SignerKind::Hasher => Arc::new(HasherSigner::new(secret)),
    }
}
