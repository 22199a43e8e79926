use clap::{ArgGroup, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "spamsweep",
    version,
    about = "Scan an IMAP inbox with SpamAssassin, move spam aside and train from folders",
    after_help = "Your inbox will remain untouched unless you specify --flag or --delete.",
    group(ArgGroup::new("learn_filter").args(["learn_flagged", "learn_unflagged"])),
    group(ArgGroup::new("transport").args(["nossl", "starttls"]))
)]
pub struct Cli {
    /// IMAP server name
    #[arg(long = "imaphost", value_name = "HOSTNAME")]
    pub imap_host: Option<String>,

    /// Who you login as
    #[arg(long = "imapuser", value_name = "USERNAME")]
    pub imap_user: Option<String>,

    /// IMAP account password
    #[arg(long = "imappasswd", value_name = "PASSWD")]
    pub imap_password: Option<String>,

    /// Use a custom port (default: 993, or 143 with --nossl/--starttls)
    #[arg(long = "imapport", value_name = "PORT")]
    pub imap_port: Option<u16>,

    /// Don't use TLS to connect to the IMAP server
    #[arg(long)]
    pub nossl: bool,

    /// Upgrade a plain connection with STARTTLS
    #[arg(long)]
    pub starttls: bool,

    /// Name of your inbox folder [default: INBOX]
    #[arg(long = "imapinbox", value_name = "MBOX")]
    pub inbox: Option<String>,

    /// Name of your spam folder [default: INBOX.Spam]
    #[arg(long = "spaminbox", value_name = "MBOX")]
    pub spam_folder: Option<String>,

    /// Name of your learn spam folder
    #[arg(long = "learnspambox", value_name = "MBOX")]
    pub learn_spam_folder: Option<String>,

    /// Name of your learn ham folder
    #[arg(long = "learnhambox", value_name = "MBOX")]
    pub learn_ham_folder: Option<String>,

    /// Move learnt ham to this folder
    #[arg(long = "movehamto", value_name = "MBOX")]
    pub move_ham_to: Option<String>,

    /// List IMAP folders and exit
    #[arg(long = "imaplist")]
    pub list_folders: bool,

    /// Do not actually make any changes
    #[arg(long = "dryrun")]
    pub dry_run: bool,

    /// Mark spam for deletion from your inbox
    #[arg(long)]
    pub delete: bool,

    /// Delete any spam with a score higher than this
    #[arg(long = "deletehigherthan", value_name = "SCORE")]
    pub delete_higher_than: Option<f32>,

    /// Use exit codes to detail what happened
    #[arg(long = "exitcodes")]
    pub exit_codes: bool,

    /// Expunge messages marked for deletion (only useful with --delete)
    #[arg(long)]
    pub expunge: bool,

    /// Flag spam in your inbox
    #[arg(long)]
    pub flag: bool,

    /// Delete by copying to the '[Gmail]/Trash' folder
    #[arg(long)]
    pub gmail: bool,

    /// Don't stop if the lock file is present
    #[arg(long = "ignorelockfile")]
    pub ignore_lock: bool,

    /// Lifetime of the lock file in minutes
    #[arg(long = "lockfilegrace", value_name = "MIN", default_value_t = 240.0)]
    pub lock_grace: f64,

    /// Override the lock file name
    #[arg(long = "lockfilename", value_name = "FILE")]
    pub lock_file: Option<PathBuf>,

    /// Messages larger than this are ignored as they are unlikely to be spam
    #[arg(long = "maxsize", value_name = "BYTES", default_value_t = 120_000)]
    pub max_size: u64,

    /// Prevent interactive requests
    #[arg(long = "noninteractive")]
    pub non_interactive: bool,

    /// Don't include the SpamAssassin report in the copy put in your spam folder
    #[arg(long = "noreport")]
    pub no_report: bool,

    /// Don't print stats
    #[arg(long = "nostats")]
    pub no_stats: bool,

    /// Stop after scanning this many unseen mails (0 = no limit)
    #[arg(long = "partialrun", value_name = "NUM", default_value_t = 50)]
    pub partial_run: usize,

    /// File used to store the password
    #[arg(long = "passwdfilename", value_name = "FILE")]
    pub password_file: Option<PathBuf>,

    /// Store the password for future runs
    #[arg(long = "savepw")]
    pub save_password: bool,

    /// Keep the saved password in the OS keyring instead of a file
    #[arg(long)]
    pub keyring: bool,

    /// Use spamc instead of the standalone spamassassin binary
    #[arg(long)]
    pub spamc: bool,

    /// Don't search spam, just learn from folders
    #[arg(long = "teachonly")]
    pub teach_only: bool,

    /// Override the seen-UID track file prefix
    #[arg(long = "trackfile", value_name = "FILE")]
    pub track_file: Option<PathBuf>,

    /// Only learn flagged messages
    #[arg(long = "learnflagged")]
    pub learn_flagged: bool,

    /// Only learn unflagged messages
    #[arg(long = "learnunflagged")]
    pub learn_unflagged: bool,

    /// Mark learnt messages for deletion
    #[arg(long = "learnthendestroy")]
    pub learn_then_destroy: bool,

    /// Flag learnt messages
    #[arg(long = "learnthenflag")]
    pub learn_then_flag: bool,

    /// Show IMAP traffic
    #[arg(long)]
    pub verbose: bool,

    /// Show mail bodies in debug output
    #[arg(long = "verbose-mails")]
    pub verbose_mails: bool,

    /// Config file (default: <config dir>/spamsweep/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
