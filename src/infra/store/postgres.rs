//! Postgres pipeline store.
//!
//! Claims run the statement from [`PollerStage::update_sql`] and report
//! `rows_affected` untouched; the poller decides what a count other than one
//! means.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::core::claim::PollerStage;
use crate::core::record::{
    migrations, ChainConfirmation, MessageKind, ProgressRecord, Stage, StageOutput, StageSlot,
    MESSAGE_WAITS_TABLE, SDR_PIPELINE_TABLE,
};
use crate::core::store::PipelineStore;
use crate::core::PipelineError;
use crate::util::serde::{ChainEpoch, RegisteredSealProof, SectorId, TaskId, TipSetKey};

const RECORD_COLUMNS: &str = "sp_id, sector_number, reg_seal_proof, \
    task_id_sdr, after_sdr, task_id_tree_d, after_tree_d, task_id_tree_c, after_tree_c, \
    task_id_tree_r, after_tree_r, task_id_precommit_msg, after_precommit_msg, precommit_msg_cid, \
    after_precommit_msg_success, seed_epoch, precommit_msg_tsk, task_id_porep, porep_proof, \
    after_porep, task_id_commit_msg, after_commit_msg, commit_msg_cid, after_commit_msg_success, \
    commit_msg_tsk, failed, failed_reason";

fn store_err(e: sqlx::Error) -> PipelineError {
    PipelineError::Store(e.to_string())
}

fn key(sector: SectorId) -> Result<(i64, i64), PipelineError> {
    let sp_id = i64::try_from(sector.miner.0)
        .map_err(|_| PipelineError::Store(format!("sp_id {} exceeds BIGINT", sector.miner)))?;
    let number = i64::try_from(sector.number.0)
        .map_err(|_| PipelineError::Store(format!("sector number {} exceeds BIGINT", sector.number)))?;
    Ok((sp_id, number))
}

fn slot(row: &PgRow, stage: Stage) -> Result<StageSlot, PipelineError> {
    Ok(StageSlot {
        task_id: row.try_get(stage.task_column()).map_err(store_err)?,
        done: row.try_get(stage.done_column()).map_err(store_err)?,
    })
}

fn record_from_row(row: &PgRow) -> Result<ProgressRecord, PipelineError> {
    let sp_id: i64 = row.try_get("sp_id").map_err(store_err)?;
    let number: i64 = row.try_get("sector_number").map_err(store_err)?;
    let sector = SectorId::new(
        u64::try_from(sp_id).map_err(|_| PipelineError::Store(format!("negative sp_id {sp_id}")))?,
        u64::try_from(number)
            .map_err(|_| PipelineError::Store(format!("negative sector number {number}")))?,
    );
    let proof: String = row.try_get("reg_seal_proof").map_err(store_err)?;
    let reg_seal_proof: RegisteredSealProof = proof.parse().map_err(PipelineError::Store)?;
    let precommit_tsk: Option<String> = row.try_get("precommit_msg_tsk").map_err(store_err)?;
    let commit_tsk: Option<String> = row.try_get("commit_msg_tsk").map_err(store_err)?;
    let porep_proof: Option<Vec<u8>> = row.try_get("porep_proof").map_err(store_err)?;

    Ok(ProgressRecord {
        sector,
        reg_seal_proof,
        sdr: slot(row, Stage::Sdr)?,
        tree_d: slot(row, Stage::TreeD)?,
        tree_c: slot(row, Stage::TreeC)?,
        tree_r: slot(row, Stage::TreeR)?,
        precommit_msg: slot(row, Stage::PrecommitMsg)?,
        precommit_msg_cid: row.try_get("precommit_msg_cid").map_err(store_err)?,
        after_precommit_msg_success: row
            .try_get("after_precommit_msg_success")
            .map_err(store_err)?,
        seed_epoch: row.try_get("seed_epoch").map_err(store_err)?,
        precommit_msg_tsk: precommit_tsk.map(TipSetKey),
        porep: slot(row, Stage::PoRep)?,
        porep_proof: porep_proof.unwrap_or_default(),
        commit_msg: slot(row, Stage::CommitMsg)?,
        commit_msg_cid: row.try_get("commit_msg_cid").map_err(store_err)?,
        after_commit_msg_success: row
            .try_get("after_commit_msg_success")
            .map_err(store_err)?,
        commit_msg_tsk: commit_tsk.map(TipSetKey),
        failed: row.try_get("failed").map_err(store_err)?,
        failed_reason: row.try_get("failed_reason").map_err(store_err)?,
    })
}

/// Pipeline store backed by a Postgres pool.
pub struct PostgresPipelineStore {
    pool: PgPool,
}

impl PostgresPipelineStore {
    /// Wrap an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool of at most `max_connections`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, PipelineError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(store_err)?;
        Ok(Self::new(pool))
    }

    /// Create the pipeline tables if missing.
    pub async fn migrate(&self) -> Result<(), PipelineError> {
        for statement in migrations() {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for PostgresPipelineStore {
    async fn load_active(&self) -> Result<Vec<ProgressRecord>, PipelineError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {SDR_PIPELINE_TABLE} \
             WHERE after_commit_msg_success = FALSE ORDER BY sp_id, sector_number"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(record_from_row).collect()
    }

    async fn claim(
        &self,
        stage: PollerStage,
        sector: SectorId,
        task_id: TaskId,
    ) -> Result<u64, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = stage.update_sql();
        let result = sqlx::query(&sql)
            .bind(task_id)
            .bind(sp_id)
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn message_execution(
        &self,
        sector: SectorId,
        kind: MessageKind,
    ) -> Result<Option<ChainConfirmation>, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = format!(
            "SELECT mw.executed_tsk_cid, mw.executed_tsk_epoch, mw.executed_msg_cid, \
                    mw.executed_rcpt_exitcode, mw.executed_rcpt_gas_used \
             FROM {SDR_PIPELINE_TABLE} sp \
             JOIN {MESSAGE_WAITS_TABLE} mw ON mw.signed_message_cid = sp.{} \
             WHERE sp.sp_id = $1 AND sp.sector_number = $2 AND mw.executed_tsk_epoch IS NOT NULL",
            kind.cid_column()
        );
        let row = sqlx::query(&sql)
            .bind(sp_id)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let tsk: String = row.try_get("executed_tsk_cid").map_err(store_err)?;
        Ok(Some(ChainConfirmation {
            executed_tsk: TipSetKey(tsk),
            executed_epoch: row.try_get("executed_tsk_epoch").map_err(store_err)?,
            executed_msg_cid: row.try_get("executed_msg_cid").map_err(store_err)?,
            exit_code: row.try_get("executed_rcpt_exitcode").map_err(store_err)?,
            gas_used: row.try_get("executed_rcpt_gas_used").map_err(store_err)?,
        }))
    }

    async fn set_precommit_landed(
        &self,
        sector: SectorId,
        seed_epoch: ChainEpoch,
        tsk: &TipSetKey,
    ) -> Result<u64, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = MessageKind::Precommit.landing_sql();
        let result = sqlx::query(&sql)
            .bind(seed_epoch)
            .bind(&tsk.0)
            .bind(sp_id)
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn set_commit_landed(
        &self,
        sector: SectorId,
        tsk: &TipSetKey,
    ) -> Result<u64, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = MessageKind::Commit.landing_sql();
        let result = sqlx::query(&sql)
            .bind(&tsk.0)
            .bind(sp_id)
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_sector(
        &self,
        sector: SectorId,
        proof: RegisteredSealProof,
    ) -> Result<(), PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = format!(
            "INSERT INTO {SDR_PIPELINE_TABLE} (sp_id, sector_number, reg_seal_proof) VALUES ($1, $2, $3)"
        );
        sqlx::query(&sql)
            .bind(sp_id)
            .bind(number)
            .bind(proof.label())
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn complete_stage(
        &self,
        sector: SectorId,
        stage: Stage,
        output: StageOutput,
    ) -> Result<u64, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let column = stage.output_column(&output);
        let sql = stage.complete_sql(column);
        let query = sqlx::query(&sql).bind(sp_id).bind(number);
        let query = match (column, output) {
            (Some(_), StageOutput::Proof(proof)) => query.bind(proof),
            (Some(_), StageOutput::Message(cid)) => query.bind(cid),
            _ => query,
        };
        let result = query.execute(&self.pool).await.map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn mark_failed(&self, sector: SectorId, reason: &str) -> Result<u64, PipelineError> {
        let (sp_id, number) = key(sector)?;
        let sql = format!(
            "UPDATE {SDR_PIPELINE_TABLE} SET failed = TRUE, failed_reason = $1 \
             WHERE sp_id = $2 AND sector_number = $3"
        );
        let result = sqlx::query(&sql)
            .bind(reason)
            .bind(sp_id)
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn record_message_execution(
        &self,
        signed_cid: &str,
        outcome: ChainConfirmation,
    ) -> Result<(), PipelineError> {
        let sql = format!(
            "INSERT INTO {MESSAGE_WAITS_TABLE} (signed_message_cid, executed_tsk_cid, \
             executed_tsk_epoch, executed_msg_cid, executed_rcpt_exitcode, executed_rcpt_gas_used) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (signed_message_cid) DO UPDATE SET \
             executed_tsk_cid = EXCLUDED.executed_tsk_cid, \
             executed_tsk_epoch = EXCLUDED.executed_tsk_epoch, \
             executed_msg_cid = EXCLUDED.executed_msg_cid, \
             executed_rcpt_exitcode = EXCLUDED.executed_rcpt_exitcode, \
             executed_rcpt_gas_used = EXCLUDED.executed_rcpt_gas_used"
        );
        sqlx::query(&sql)
            .bind(signed_cid)
            .bind(outcome.executed_tsk.0)
            .bind(outcome.executed_epoch)
            .bind(outcome.executed_msg_cid)
            .bind(outcome.exit_code)
            .bind(outcome.gas_used)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
