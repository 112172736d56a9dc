
use std::collections::HashSet;

use log::warn;

use crate::content::NegotiationAction;
use crate::error::{Error, Result};

/// Parameters of one logical media stream: an identifier pair plus the SSRCs
/// it sends on and an optional CNAME label.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub group_id: String,
    pub id: String,
    pub ssrcs: Vec<u32>,
    pub cname: Option<String>,
}

impl StreamParams {
    pub fn with_ssrcs(group_id: &str, id: &str, ssrcs: &[u32]) -> Self {
        StreamParams {
            group_id: group_id.to_owned(),
            id: id.to_owned(),
            ssrcs: ssrcs.to_vec(),
            cname: None,
        }
    }

    pub fn first_ssrc(&self) -> Option<u32> {
        self.ssrcs.first().copied()
    }

    pub fn has_ssrc(&self, ssrc: u32) -> bool {
        self.ssrcs.contains(&ssrc)
    }

    fn same_id(&self, other: &StreamParams) -> bool {
        self.group_id == other.group_id && self.id == other.id
    }
}

/// The set of streams added to or removed from a table by one negotiation
/// update, for forwarding to the media collaborator.
#[derive(Debug, Default)]
pub struct StreamChanges {
    pub added: Vec<StreamParams>,
    pub removed: Vec<StreamParams>,
}

/// StreamTable books the locally-sent and remotely-received stream
/// parameters plus the per-local-SSRC mute state. The local and remote
/// tables are independent; SSRC uniqueness is enforced within each.
#[derive(Debug, Default)]
pub struct StreamTable {
    local: Vec<StreamParams>,
    remote: Vec<StreamParams>,
    muted: HashSet<u32>,
}

impl StreamTable {
    pub fn new() -> Self {
        StreamTable::default()
    }

    pub fn local_streams(&self) -> &[StreamParams] {
        &self.local
    }

    pub fn remote_streams(&self) -> &[StreamParams] {
        &self.remote
    }

    pub fn add_send_stream(&mut self, params: StreamParams) -> Result<()> {
        Self::add_stream(&mut self.local, params)
    }

    pub fn remove_send_stream(&mut self, ssrc: u32) -> Result<StreamParams> {
        let removed = Self::remove_stream(&mut self.local, ssrc)?;
        for ssrc in &removed.ssrcs {
            self.muted.remove(ssrc);
        }
        Ok(removed)
    }

    pub fn add_recv_stream(&mut self, params: StreamParams) -> Result<()> {
        Self::add_stream(&mut self.remote, params)
    }

    pub fn remove_recv_stream(&mut self, ssrc: u32) -> Result<StreamParams> {
        Self::remove_stream(&mut self.remote, ssrc)
    }

    /// Mute state is tracked per local (send) SSRC.
    pub fn set_muted(&mut self, ssrc: u32, muted: bool) -> Result<()> {
        if !self.local.iter().any(|s| s.has_ssrc(ssrc)) {
            return Err(Error::SsrcNotFound(ssrc));
        }
        if muted {
            self.muted.insert(ssrc);
        } else {
            self.muted.remove(&ssrc);
        }
        Ok(())
    }

    pub fn is_muted(&self, ssrc: u32) -> bool {
        self.muted.contains(&ssrc)
    }

    pub fn update_local_streams(
        &mut self,
        new_streams: &[StreamParams],
        action: NegotiationAction,
    ) -> (StreamChanges, Vec<Error>) {
        let mut changes = StreamChanges::default();
        let errs = match action {
            NegotiationAction::Update => Self::patch(&mut self.local, new_streams, &mut changes),
            _ => Self::replace(&mut self.local, new_streams, &mut changes),
        };
        for removed in &changes.removed {
            for ssrc in &removed.ssrcs {
                self.muted.remove(ssrc);
            }
        }
        (changes, errs)
    }

    pub fn update_remote_streams(
        &mut self,
        new_streams: &[StreamParams],
        action: NegotiationAction,
    ) -> (StreamChanges, Vec<Error>) {
        let mut changes = StreamChanges::default();
        let errs = match action {
            NegotiationAction::Update => Self::patch(&mut self.remote, new_streams, &mut changes),
            _ => Self::replace(&mut self.remote, new_streams, &mut changes),
        };
        (changes, errs)
    }

    fn add_stream(table: &mut Vec<StreamParams>, params: StreamParams) -> Result<()> {
        if params.ssrcs.is_empty() {
            return Err(Error::EmptySsrcs(params.id));
        }
        for ssrc in &params.ssrcs {
            if table.iter().any(|s| s.has_ssrc(*ssrc)) {
                return Err(Error::DuplicateSsrc(*ssrc));
            }
        }
        table.push(params);
        Ok(())
    }

    fn remove_stream(table: &mut Vec<StreamParams>, ssrc: u32) -> Result<StreamParams> {
        match table.iter().position(|s| s.has_ssrc(ssrc)) {
            Some(idx) => Ok(table.remove(idx)),
            None => Err(Error::SsrcNotFound(ssrc)),
        }
    }

    /// Full replace for offer/answer/provisional-answer: streams present
    /// only in the old set are removed, streams present only in the new set
    /// are added, and a stream whose SSRC set changed is removed and
    /// re-added. Failures are collected; surviving work is still applied.
    fn replace(
        table: &mut Vec<StreamParams>,
        new_streams: &[StreamParams],
        changes: &mut StreamChanges,
    ) -> Vec<Error> {
        let mut errs = vec![];

        let mut kept = vec![];
        for old in table.drain(..) {
            match new_streams.iter().find(|n| n.same_id(&old)) {
                Some(new) if new.ssrcs == old.ssrcs => kept.push(old),
                _ => changes.removed.push(old),
            }
        }
        *table = kept;

        for new in new_streams {
            if table.iter().any(|s| s.same_id(new)) {
                continue;
            }
            match Self::add_stream(table, new.clone()) {
                Ok(()) => changes.added.push(new.clone()),
                Err(e) => {
                    warn!("stream update rejected {}: {e}", new.id);
                    errs.push(e);
                }
            }
        }

        errs
    }

    /// Incremental patch for update actions: an entry with SSRCs means "add
    /// if absent", an entry with no SSRCs means "remove the matching entry
    /// by group/stream id"; entries not mentioned are untouched.
    fn patch(
        table: &mut Vec<StreamParams>,
        new_streams: &[StreamParams],
        changes: &mut StreamChanges,
    ) -> Vec<Error> {
        let mut errs = vec![];

        for new in new_streams {
            if new.ssrcs.is_empty() {
                match table.iter().position(|s| s.same_id(new)) {
                    Some(idx) => changes.removed.push(table.remove(idx)),
                    None => errs.push(Error::StreamNotFound(new.id.clone())),
                }
                continue;
            }

            if table.iter().any(|s| s.same_id(new)) {
                continue;
            }
            match Self::add_stream(table, new.clone()) {
                Ok(()) => changes.added.push(new.clone()),
                Err(e) => {
                    warn!("stream update rejected {}: {e}", new.id);
                    errs.push(e);
                }
            }
        }

        errs
    }
}
