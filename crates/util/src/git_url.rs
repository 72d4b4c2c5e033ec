//! # Hosted Git URL Parsing
//!
//! Recognizes repository references on the common Git hosts and renders
//! them back in any of the forms those hosts understand: clone URLs (HTTPS,
//! SSH, scp-style), shortcuts (`github:user/repo`), browse links, raw file
//! links, tarballs, issue trackers and documentation pages.
//!
//! Accepted inputs include bare `user/repo` shorthands, provider shortcuts,
//! scp-style addresses (`git@github.com:user/repo.git`) and URLs using the
//! `https`, `http`, `git`, `git+https`, `git+ssh` and `ssh` protocols.

use std::fmt;

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Characters left alone by `encodeURIComponent`-style encoding.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Errors surfaced while parsing a Git reference.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GitUrlError {
    #[error("git URL is empty")]
    Empty,
    #[error("could not parse git URL `{input}`: {reason}")]
    Malformed { input: String, reason: String },
    #[error("`{0}` is not a known git host")]
    UnknownHost(String),
    #[error("protocol `{protocol}:` is not supported for {provider}")]
    UnsupportedProtocol { protocol: String, provider: Provider },
    #[error("git URL `{0}` does not name a user and project")]
    MissingProject(String),
}

/// A supported Git hosting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
    Bitbucket,
    Gist,
    Sourcehut,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::GitHub,
        Provider::GitLab,
        Provider::Bitbucket,
        Provider::Gist,
        Provider::Sourcehut,
    ];

    /// Shortcut prefix (without the colon).
    pub fn name(self) -> &'static str {
        match self {
            Provider::GitHub => "github",
            Provider::GitLab => "gitlab",
            Provider::Bitbucket => "bitbucket",
            Provider::Gist => "gist",
            Provider::Sourcehut => "sourcehut",
        }
    }

    pub fn domain(self) -> &'static str {
        match self {
            Provider::GitHub => "github.com",
            Provider::GitLab => "gitlab.com",
            Provider::Bitbucket => "bitbucket.org",
            Provider::Gist => "gist.github.com",
            Provider::Sourcehut => "git.sr.ht",
        }
    }

    fn tree_path(self) -> &'static str {
        match self {
            Provider::Bitbucket => "src",
            _ => "tree",
        }
    }

    fn blob_path(self) -> &'static str {
        match self {
            Provider::GitHub => "blob",
            Provider::Bitbucket => "src",
            _ => "tree",
        }
    }

    fn from_host(host: &str) -> Option<Self> {
        let host = host.strip_prefix("www.").unwrap_or(host);
        Self::ALL.into_iter().find(|provider| provider.domain() == host)
    }

    fn from_shortcut(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|provider| provider.name() == name)
    }

    fn accepts_protocol(self, scheme: &str) -> bool {
        match scheme {
            "git+ssh" | "git+https" | "ssh" | "https" => true,
            "git" => matches!(self, Provider::GitHub | Provider::Gist),
            "http" => self == Provider::GitHub,
            _ => false,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The form a reference was written in, reused when rendering it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Shortcut,
    Git,
    Ssh,
    SshUrl,
    Https,
}

/// A repository reference on a known Git host.
///
/// # Example
/// ```rust
/// use knit_util::git_url::{HostedGit, Provider};
///
/// let info = HostedGit::parse("git@github.com:npm/cli.git#v10.0.0").unwrap();
/// assert_eq!(info.provider, Provider::GitHub);
/// assert_eq!(info.https(), "git+https://github.com/npm/cli.git#v10.0.0");
/// assert_eq!(info.tarball(), "https://codeload.github.com/npm/cli/tar.gz/v10.0.0");
/// assert_eq!(info.to_string(), "git@github.com:npm/cli.git#v10.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedGit {
    pub provider: Provider,
    /// Owner; nested groups for GitLab (`group/subgroup`). Optional for gists.
    pub user: Option<String>,
    /// Repository name without a `.git` suffix (the gist id for gists).
    pub project: String,
    /// Branch, tag or commit the reference points at.
    pub committish: Option<String>,
    /// Credentials carried by HTTPS inputs (`user` or `user:token`).
    pub auth: Option<String>,
    pub default_representation: Representation,
}

impl HostedGit {
    /// Parses `input`, reporting why it is not a hosted Git reference.
    pub fn parse(input: &str) -> Result<Self, GitUrlError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(GitUrlError::Empty);
        }

        if is_github_shorthand(input) {
            return Self::parse_shortcut(Provider::GitHub, input, input);
        }

        if let Some((prefix, rest)) = input.split_once(':')
            && !rest.starts_with("//")
            && let Some(provider) = Provider::from_shortcut(&prefix.to_ascii_lowercase())
        {
            return Self::parse_shortcut(provider, rest, input);
        }

        if !input.contains("://")
            && let Some(captures) = scp_pattern().captures(input)
        {
            let host = captures["host"].to_ascii_lowercase();
            let provider = Provider::from_host(&host).ok_or(GitUrlError::UnknownHost(host))?;
            let path = captures["path"].trim_matches('/');
            let segments: Vec<&str> = path.split('/').collect();
            let fragment = captures.name("committish").map(|found| found.as_str());
            return Self::assemble(provider, &segments, fragment, None, Representation::Ssh, input);
        }

        Self::parse_url(input)
    }

    /// Like [`HostedGit::parse`], discarding the reason for rejection.
    pub fn from_url(input: &str) -> Option<Self> {
        match Self::parse(input) {
            Ok(info) => Some(info),
            Err(error) => {
                debug!(input, %error, "not a hosted git reference");
                None
            }
        }
    }

    fn parse_shortcut(provider: Provider, rest: &str, input: &str) -> Result<Self, GitUrlError> {
        let (path, committish) = match rest.split_once('#') {
            Some((path, committish)) => (path, Some(committish)),
            None => (rest, None),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        Self::assemble(provider, &segments, committish, None, Representation::Shortcut, input)
    }

    fn parse_url(input: &str) -> Result<Self, GitUrlError> {
        let malformed = |reason: String| GitUrlError::Malformed {
            input: input.to_string(),
            reason,
        };

        if !input.contains("://") {
            return Err(malformed("expected a URL, an scp-style address or a shortcut".to_string()));
        }

        let url = Url::parse(&correct_scp_authority(input)).map_err(|error| malformed(error.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| malformed("missing host".to_string()))?
            .to_ascii_lowercase();
        let provider = Provider::from_host(&host).ok_or(GitUrlError::UnknownHost(host))?;

        let scheme = url.scheme();
        if !provider.accepts_protocol(scheme) {
            return Err(GitUrlError::UnsupportedProtocol {
                protocol: scheme.to_string(),
                provider,
            });
        }

        let representation = match scheme {
            "git+ssh" | "ssh" => Representation::SshUrl,
            "git" => Representation::Git,
            _ => Representation::Https,
        };

        let auth = match scheme {
            "https" | "http" | "git+https" if !url.username().is_empty() => Some(match url.password() {
                Some(password) => format!("{}:{}", url.username(), password),
                None => url.username().to_string(),
            }),
            _ => None,
        };

        let segments: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        let fragment = url.fragment();
        Self::assemble(provider, &segments, fragment, auth, representation, input)
    }

    fn assemble(
        provider: Provider,
        segments: &[&str],
        fragment: Option<&str>,
        auth: Option<String>,
        default_representation: Representation,
        input: &str,
    ) -> Result<Self, GitUrlError> {
        let fragment = fragment.filter(|value| !value.is_empty());
        let (user, project, committish) = extract_repository(provider, segments, fragment)
            .ok_or_else(|| GitUrlError::MissingProject(input.to_string()))?;

        let project = project.strip_suffix(".git").unwrap_or(project);
        if project.is_empty() || user.as_deref().is_some_and(str::is_empty) {
            return Err(GitUrlError::MissingProject(input.to_string()));
        }
        if user.is_none() && provider != Provider::Gist {
            return Err(GitUrlError::MissingProject(input.to_string()));
        }

        Ok(Self {
            provider,
            user: user.map(|user| decode(&user)),
            project: decode(project),
            committish: committish.map(|committish| decode(&committish)),
            auth,
            default_representation,
        })
    }

    /// `git+https://` clone URL (plain `https://` for Sourcehut).
    pub fn https(&self) -> String {
        let domain = self.provider.domain();
        match self.provider {
            Provider::Gist => {
                format!("git+https://{}/{}.git{}", domain, self.encoded_project(), self.hash_committish())
            }
            Provider::Sourcehut => format!("https://{}/{}.git{}", domain, self.repo_path(), self.hash_committish()),
            _ => format!(
                "git+https://{}{}/{}.git{}",
                self.auth_prefix(),
                domain,
                self.repo_path(),
                self.hash_committish()
            ),
        }
    }

    /// scp-style SSH address, `git@host:user/project.git`.
    pub fn ssh(&self) -> String {
        format!("git@{}:{}.git{}", self.provider.domain(), self.clone_path(), self.hash_committish())
    }

    /// `git+ssh://` clone URL.
    pub fn sshurl(&self) -> String {
        format!("git+ssh://git@{}/{}.git{}", self.provider.domain(), self.clone_path(), self.hash_committish())
    }

    /// `git://` clone URL, offered by GitHub and gists only.
    pub fn git(&self) -> Option<String> {
        match self.provider {
            Provider::GitHub => Some(format!(
                "git://{}{}/{}.git{}",
                self.auth_prefix(),
                self.provider.domain(),
                self.repo_path(),
                self.hash_committish()
            )),
            Provider::Gist => Some(format!(
                "git://{}/{}.git{}",
                self.provider.domain(),
                self.encoded_project(),
                self.hash_committish()
            )),
            _ => None,
        }
    }

    /// Provider shortcut, `github:user/project#committish`.
    pub fn shortcut(&self) -> String {
        format!("{}:{}{}", self.provider.name(), self.clone_path(), self.hash_committish())
    }

    /// `user/project#committish`.
    pub fn path(&self) -> String {
        format!("{}{}", self.clone_path(), self.hash_committish())
    }

    /// Web page for the repository, or for `path` inside it.
    pub fn browse(&self, path: Option<&str>, fragment: Option<&str>) -> String {
        self.browse_with(self.provider.tree_path(), path, fragment)
    }

    /// Web page showing the contents of the file at `path`.
    pub fn browse_file(&self, path: &str, fragment: Option<&str>) -> String {
        self.browse_with(self.provider.blob_path(), Some(path), fragment)
    }

    fn browse_with(&self, kind: &str, path: Option<&str>, fragment: Option<&str>) -> String {
        let domain = self.provider.domain();
        if self.provider == Provider::Gist {
            let committish = self.encoded_committish().map(|value| format!("/{}", value)).unwrap_or_default();
            let anchor = path
                .map(|path| format!("#file-{}", format_hash_fragment(path)))
                .unwrap_or_default();
            return format!("https://{}/{}{}{}", domain, self.encoded_project(), committish, anchor);
        }

        match path {
            None => {
                let tree = self
                    .encoded_committish()
                    .map(|committish| format!("/{}/{}", self.provider.tree_path(), committish))
                    .unwrap_or_default();
                format!("https://{}/{}{}", domain, self.repo_path(), tree)
            }
            Some(path) => {
                let anchor = fragment
                    .map(format_hash_fragment)
                    .filter(|anchor| !anchor.is_empty())
                    .map(|anchor| format!("#{}", anchor))
                    .unwrap_or_default();
                format!(
                    "https://{}/{}/{}/{}/{}{}",
                    domain,
                    self.repo_path(),
                    kind,
                    self.encoded_committish_or_head(),
                    encode_path(path.trim_start_matches('/')),
                    anchor
                )
            }
        }
    }

    /// Raw download link for the file at `path`.
    pub fn file(&self, path: &str) -> String {
        let path = encode_path(path.trim_start_matches('/'));
        let reference = self.encoded_committish_or_head();
        match self.provider {
            Provider::GitHub => format!(
                "https://{}raw.githubusercontent.com/{}/{}/{}",
                self.auth_prefix(),
                self.repo_path(),
                reference,
                path
            ),
            Provider::Gist => {
                let committish = self.encoded_committish().map(|value| format!("/{}", value)).unwrap_or_default();
                format!(
                    "https://gist.githubusercontent.com/{}/raw{}/{}",
                    self.repo_path(),
                    committish,
                    path
                )
            }
            Provider::Sourcehut => format!(
                "https://{}/{}/blob/{}/{}",
                self.provider.domain(),
                self.repo_path(),
                reference,
                path
            ),
            Provider::GitLab | Provider::Bitbucket => {
                format!("https://{}/{}/raw/{}/{}", self.provider.domain(), self.repo_path(), reference, path)
            }
        }
    }

    /// Tarball download link for the committish (`HEAD` when unset).
    pub fn tarball(&self) -> String {
        let reference = self.encoded_committish_or_head();
        let domain = self.provider.domain();
        match self.provider {
            Provider::GitHub => format!("https://codeload.{}/{}/tar.gz/{}", domain, self.repo_path(), reference),
            Provider::GitLab => format!(
                "https://{}/{}/repository/archive.tar.gz?ref={}",
                domain,
                self.repo_path(),
                reference
            ),
            Provider::Bitbucket => format!("https://{}/{}/get/{}.tar.gz", domain, self.repo_path(), reference),
            Provider::Gist => {
                format!("https://codeload.github.com/gist/{}/tar.gz/{}", self.encoded_project(), reference)
            }
            Provider::Sourcehut => format!("https://{}/{}/archive/{}.tar.gz", domain, self.repo_path(), reference),
        }
    }

    /// Issue tracker link.
    pub fn bugs(&self) -> String {
        match self.provider {
            Provider::Gist => format!("https://{}/{}", self.provider.domain(), self.encoded_project()),
            Provider::Sourcehut => format!("https://todo.sr.ht/{}", self.repo_path()),
            _ => format!("https://{}/{}/issues", self.provider.domain(), self.repo_path()),
        }
    }

    /// Documentation link (the README anchor of the browse page).
    pub fn docs(&self) -> String {
        match self.provider {
            Provider::Gist => self.browse(None, None),
            _ => format!("{}#readme", self.browse(None, None)),
        }
    }

    /// Renders the reference in the requested form. Forms the provider does
    /// not offer fall back to `sshurl`.
    pub fn render(&self, representation: Representation) -> String {
        match representation {
            Representation::Shortcut => self.shortcut(),
            Representation::Git => self.git().unwrap_or_else(|| self.sshurl()),
            Representation::Ssh => self.ssh(),
            Representation::SshUrl => self.sshurl(),
            Representation::Https => self.https(),
        }
    }

    fn auth_prefix(&self) -> String {
        self.auth.as_ref().map(|auth| format!("{}@", auth)).unwrap_or_default()
    }

    fn hash_committish(&self) -> String {
        self.encoded_committish()
            .map(|committish| format!("#{}", committish))
            .unwrap_or_default()
    }

    fn encoded_committish(&self) -> Option<String> {
        self.committish.as_deref().map(encode_component)
    }

    fn encoded_committish_or_head(&self) -> String {
        encode_component(self.committish.as_deref().unwrap_or("HEAD"))
    }

    fn encoded_project(&self) -> String {
        encode_component(&self.project)
    }

    /// `user/project`, or just the project when there is no user.
    fn repo_path(&self) -> String {
        match &self.user {
            Some(user) => format!("{}/{}", encode_path(user), self.encoded_project()),
            None => self.encoded_project(),
        }
    }

    /// Path used in clone URLs; gists are cloned by id alone.
    fn clone_path(&self) -> String {
        match self.provider {
            Provider::Gist => self.encoded_project(),
            _ => self.repo_path(),
        }
    }
}

impl fmt::Display for HostedGit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(self.default_representation))
    }
}

type Extracted<'a> = (Option<String>, &'a str, Option<String>);

/// Splits path segments into user, project and committish per provider.
fn extract_repository<'a>(provider: Provider, segments: &[&'a str], fragment: Option<&str>) -> Option<Extracted<'a>> {
    let fragment = fragment.map(str::to_string);
    match provider {
        Provider::GitHub => {
            let (user, project) = (*segments.first()?, *segments.get(1)?);
            let committish = match segments.get(2) {
                None | Some(&"") => fragment,
                Some(&"tree") if segments.len() > 3 => Some(segments[3..].join("/")),
                Some(_) => return None,
            };
            Some((Some(user.to_string()), project, committish))
        }
        Provider::GitLab => {
            if segments.iter().any(|segment| *segment == "archive.tar.gz") {
                return None;
            }
            let (repository, committish) = match segments.iter().position(|segment| *segment == "-") {
                Some(split) => {
                    let rest = &segments[split + 1..];
                    if rest.first() != Some(&"tree") || rest.len() < 2 {
                        return None;
                    }
                    (&segments[..split], Some(rest[1..].join("/")))
                }
                None => (segments, fragment),
            };
            let (project, groups) = repository.split_last()?;
            if groups.is_empty() {
                return None;
            }
            Some((Some(groups.join("/")), *project, committish))
        }
        Provider::Bitbucket | Provider::Sourcehut => {
            let (user, project) = (*segments.first()?, *segments.get(1)?);
            let committish = match segments.get(2) {
                None | Some(&"") => fragment,
                Some(&"get") | Some(&"archive") => return None,
                Some(&"src") | Some(&"tree") if segments.len() > 3 => Some(segments[3..].join("/")),
                Some(_) => fragment,
            };
            Some((Some(user.to_string()), project, committish))
        }
        Provider::Gist => {
            if segments.get(2) == Some(&"raw") {
                return None;
            }
            match (segments.first(), segments.get(1)) {
                (Some(user), Some(project)) if !project.is_empty() => {
                    Some((Some(user.to_string()), *project, fragment))
                }
                (Some(project), _) => Some((None, *project, fragment)),
                _ => None,
            }
        }
    }
}

/// True for bare `user/repo` references, which refer to GitHub.
fn is_github_shorthand(input: &str) -> bool {
    let first_hash = input.find('#');
    let before_hash = |index: Option<usize>| match (index, first_hash) {
        (None, _) => true,
        (Some(index), Some(hash)) => index > hash,
        (Some(_), None) => false,
    };

    let first_slash = input.find('/');
    let second_slash = first_slash.and_then(|first| input[first + 1..].find('/').map(|offset| first + 1 + offset));
    let first_space = input.find(char::is_whitespace);

    let has_slash = first_slash.is_some_and(|index| index > 0);
    let does_not_end_with_slash = match first_hash {
        Some(hash) => !input[..hash].ends_with('/'),
        None => !input.ends_with('/'),
    };

    has_slash
        && does_not_end_with_slash
        && !input.starts_with('.')
        && before_hash(first_space)
        && before_hash(input.find('@'))
        && before_hash(input.find(':'))
        && before_hash(second_slash)
}

fn scp_pattern() -> &'static Regex {
    static SCP_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(concat!(
            r"^(?:(?P<user>[^@:/\s]+)@)?(?P<host>[^@:/\s]+\.[^@:/\s]+)",
            r":(?P<path>[^/\s#][^\s#]*)(?:#(?P<committish>.*))?$",
        ))
        .unwrap()
    });

    &SCP_PATTERN
}

/// Rewrites `proto://git@host:user/repo` into `proto://git@host/user/repo`
/// so the scp-style colon is not mistaken for a port.
fn correct_scp_authority(input: &str) -> String {
    let Some(scheme_end) = input.find("://") else {
        return input.to_string();
    };
    let rest_start = scheme_end + 3;
    let rest = &input[rest_start..];
    let authority = &rest[..rest.find('/').unwrap_or(rest.len())];
    let host_start = authority.rfind('@').map(|index| index + 1).unwrap_or(0);

    if let Some(colon) = authority[host_start..].find(':') {
        let port = &authority[host_start + colon + 1..];
        if port.is_empty() || !port.chars().all(|character| character.is_ascii_digit()) {
            let absolute = rest_start + host_start + colon;
            return format!("{}/{}", &input[..absolute], &input[absolute + 1..]);
        }
    }
    input.to_string()
}

/// Turns a heading or path into the anchor form GitHub generates.
fn format_hash_fragment(fragment: &str) -> String {
    static EDGES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\W+|/|\W+$").unwrap());
    static INNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

    let lowered = fragment.to_lowercase();
    let trimmed = EDGES.replace_all(&lowered, "");
    INNER.replace_all(&trimmed, "-").into_owned()
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.split('/').map(encode_component).collect::<Vec<_>>().join("/")
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
