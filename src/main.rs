// Clippy設定はlib.rsと同じ設定を適用
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::single_match_else)]

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Generator, Shell};
use console::style;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;

use scrat_backup::core::{
    BackupConfig, BackupEngine, BackupStatus, LogFilter, LogLevel, MetadataStore, RestoreConfig,
    RestoreEngine,
};
use scrat_backup::crypto::validate_passphrase;
use scrat_backup::storage::{DestinationKind, LocalStorage};
use scrat_backup::ui::{
    display_backups, display_logs, display_search_hits, display_statistics, ProgressDisplay,
};

#[derive(Parser)]
#[command(name = "scrat-backup")]
#[command(about = "暗号化・圧縮・バージョン管理付きバックアップツール")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// メタデータDBのパス（デフォルト: データディレクトリ配下）
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// バックアップを実行
    Backup {
        /// バックアップ対象ディレクトリ（複数指定可）
        #[arg(long = "source", required_unless_present = "config")]
        sources: Vec<PathBuf>,
        /// 保存先パス
        #[arg(long, required_unless_present = "config")]
        destination: Option<PathBuf>,
        /// 保存先種別（usb/smb/sftp/webdav/rclone）
        #[arg(long, default_value = "usb")]
        destination_kind: String,
        /// 増分バックアップを作成（要: 既存のCompletedバックアップ）
        #[arg(long)]
        incremental: bool,
        /// 圧縮レベル（0-9）
        #[arg(long, default_value_t = 5)]
        compression_level: u32,
        /// アーカイブ分割サイズ（MiB）
        #[arg(long, default_value_t = 128)]
        split_size_mb: u64,
        /// 除外パターン（複数指定可、デフォルトに追加）
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
        /// 保持するバックアップ数
        #[arg(long, default_value_t = 3)]
        max_versions: usize,
        /// パスフレーズを読み込むファイル（指定なしでプロンプト）
        #[arg(long)]
        password_file: Option<PathBuf>,
        /// JSON設定ファイルから全設定を読み込む
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// バックアップから復元
    Restore {
        /// 復元するバックアップのID
        #[arg(long, conflicts_with = "at")]
        backup_id: Option<i64>,
        /// 指定時刻の状態を復元（YYYY-MM-DD HH:MM:SS）
        #[arg(long)]
        at: Option<String>,
        /// バックアップの保存先（アーカイブの取得元）
        #[arg(long)]
        from: PathBuf,
        /// 復元先パス
        #[arg(long)]
        destination: PathBuf,
        /// 一致するファイルのみ復元（glob、複数指定可）
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// 元の場所へ復元
        #[arg(long)]
        original: bool,
        /// 既存ファイルを上書き
        #[arg(long)]
        overwrite: bool,
        /// パーミッションを復元しない
        #[arg(long)]
        no_permissions: bool,
        /// パスフレーズを読み込むファイル（指定なしでプロンプト）
        #[arg(long)]
        password_file: Option<PathBuf>,
    },
    /// バックアップ一覧を表示
    #[command(alias = "ls")]
    List {
        /// ステータスで絞り込み（running/completed/failed/partial）
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        /// 統計情報も表示
        #[arg(long)]
        stats: bool,
    },
    /// バックアップ済みファイルを検索
    Search {
        /// 検索パターン（部分一致）
        pattern: String,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// ログを表示・削除
    Logs {
        /// レベルで絞り込み（DEBUG/INFO/WARNING/ERROR/CRITICAL）
        #[arg(long)]
        level: Option<String>,
        /// バックアップIDで絞り込み
        #[arg(long)]
        backup_id: Option<i64>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
        /// 指定日数より古いログを削除
        #[arg(long)]
        clear_older_than: Option<i64>,
    },
    /// シェル補完スクリプトを生成
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
    generate(generator, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// メタデータDBのデフォルトパスを解決
fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("データディレクトリが見つかりません")?;
    Ok(data_dir.join("scrat-backup").join("metadata.db"))
}

/// パスフレーズを取得（ファイルまたはプロンプト）
fn read_password(password_file: Option<&PathBuf>, confirm: bool) -> Result<String> {
    match password_file {
        Some(path) => {
            let password = fs::read_to_string(path)
                .with_context(|| format!("パスフレーズファイルの読み込みに失敗: {}", path.display()))?;
            Ok(password.trim_end_matches(['\r', '\n']).to_string())
        }
        None => {
            let mut prompt = dialoguer::Password::new().with_prompt("パスフレーズ");
            if confirm {
                prompt = prompt.with_confirmation("パスフレーズ（確認）", "パスフレーズが一致しません");
            }
            Ok(prompt.interact()?)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        print_completions(*shell, &mut cmd);
        return Ok(());
    }

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    let store = MetadataStore::open(&db_path)?;

    match cli.command {
        Commands::Backup {
            sources,
            destination,
            destination_kind,
            incremental,
            compression_level,
            split_size_mb,
            exclude_patterns,
            max_versions,
            password_file,
            config,
        } => {
            let mut backup_config = match config {
                Some(path) => {
                    let content = fs::read_to_string(&path)
                        .with_context(|| format!("設定ファイルの読み込みに失敗: {}", path.display()))?;
                    serde_json::from_str::<BackupConfig>(&content)
                        .with_context(|| "設定ファイルのパースに失敗")?
                }
                None => {
                    let destination =
                        destination.context("--destination または --config が必要です")?;
                    let mut cfg = BackupConfig::new(sources, destination, String::new());
                    cfg.destination_kind = DestinationKind::parse(&destination_kind)?;
                    cfg.compression_level = compression_level;
                    cfg.split_size = split_size_mb * 1024 * 1024;
                    cfg.max_versions = max_versions;
                    if !exclude_patterns.is_empty() {
                        let mut patterns: HashSet<String> =
                            scrat_backup::core::ExcludeFilter::default_patterns();
                        patterns.extend(exclude_patterns);
                        cfg.exclude_patterns = Some(patterns);
                    }
                    cfg
                }
            };

            if backup_config.password.is_empty() {
                backup_config.password = read_password(password_file.as_ref(), !incremental)?;
            }

            // 新規バックアップのパスフレーズはポリシーを満たす必要がある
            // （増分は既存と同じパスフレーズを使うため検証しない）
            if !incremental {
                let warnings = validate_passphrase(&backup_config.password)
                    .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
                for warning in warnings {
                    eprintln!("{} {warning}", style("警告:").yellow());
                }
            }

            let display = ProgressDisplay::new();
            let observer = display.clone();
            let storage = Box::new(LocalStorage::new(backup_config.destination_path.clone()));
            let mut engine = BackupEngine::new(&store, storage, backup_config)?
                .with_progress_callback(move |p| observer.update_backup(&p));

            let result = if incremental {
                engine.create_incremental_backup()
            } else {
                engine.create_full_backup()
            };

            match result {
                Ok(result) => {
                    display.finish("バックアップ完了");
                    println!(
                        "{} {} ({}ファイル, {} → {})",
                        style("✅ バックアップ完了:").green(),
                        result.backup_id,
                        result.files_total,
                        scrat_backup::ui::format_bytes(result.size_original),
                        scrat_backup::ui::format_bytes(result.size_compressed),
                    );
                    if !result.errors.is_empty() {
                        eprintln!(
                            "{} {}件のファイルでスキャンエラー",
                            style("警告:").yellow(),
                            result.errors.len()
                        );
                        for error in &result.errors {
                            eprintln!("  - {error}");
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    display.finish("バックアップ失敗");
                    bail!("{}", e.user_friendly_message())
                }
            }
        }

        Commands::Restore {
            backup_id,
            at,
            from,
            destination,
            patterns,
            original,
            overwrite,
            no_permissions,
            password_file,
        } => {
            let password = read_password(password_file.as_ref(), false)?;

            let mut restore_config = RestoreConfig::new(destination, password);
            restore_config.restore_to_original = original;
            restore_config.overwrite_existing = overwrite;
            restore_config.restore_permissions = !no_permissions;

            let display = ProgressDisplay::new();
            let observer = display.clone();
            let storage = Box::new(LocalStorage::new(from));
            let mut engine = RestoreEngine::new(&store, storage, restore_config)
                .with_progress_callback(move |p| observer.update_restore(&p));

            let result = match (backup_id, at) {
                (Some(id), None) => {
                    if patterns.is_empty() {
                        engine.restore_full_backup(id)
                    } else {
                        engine.restore_specific_files(id, &patterns)
                    }
                }
                (None, Some(at)) => {
                    let target = NaiveDateTime::parse_from_str(&at, "%Y-%m-%d %H:%M:%S")
                        .with_context(|| format!("時刻のパースに失敗: {at}"))?
                        .and_utc();
                    engine.restore_to_point_in_time(target)
                }
                _ => bail!("--backup-id または --at のどちらか一方を指定してください"),
            };

            match result {
                Ok(result) => {
                    display.finish("リストア完了");
                    println!(
                        "{} {}ファイル復元 ({})",
                        style("✅ リストア完了:").green(),
                        result.files_restored,
                        scrat_backup::ui::format_bytes(result.bytes_restored),
                    );
                    for error in &result.errors {
                        eprintln!("{} {error}", style("警告:").yellow());
                    }
                    Ok(())
                }
                Err(e) => {
                    display.finish("リストア失敗");
                    bail!("{}", e.user_friendly_message())
                }
            }
        }

        Commands::List {
            status,
            limit,
            stats,
        } => {
            let status = status
                .as_deref()
                .map(BackupStatus::parse)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            let backups = store.get_all_backups(status, limit)?;
            display_backups(&backups);

            if stats {
                display_statistics(&store.get_statistics()?);
            }
            Ok(())
        }

        Commands::Search { pattern, limit } => {
            let hits = store.search_files(&pattern, limit)?;
            display_search_hits(&hits);
            Ok(())
        }

        Commands::Logs {
            level,
            backup_id,
            limit,
            clear_older_than,
        } => {
            if let Some(days) = clear_older_than {
                let deleted = store.clear_logs(Some(days))?;
                println!("{deleted}件のログを削除しました");
                return Ok(());
            }

            let level = level
                .as_deref()
                .map(LogLevel::parse)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;

            let logs = store.get_logs(&LogFilter {
                level,
                backup_id,
                limit: Some(limit),
                ..LogFilter::default()
            })?;
            display_logs(&logs);
            Ok(())
        }

        Commands::Completions { .. } => unreachable!(),
    }
}
