//! Shell scripts run on cluster nodes
//!
//! Every script runs through one SSH exec call as the `ubuntu` user.

use perconaflow_remote::shell_quote;

/// Writable staging directory for uploads and config edits
pub const STAGING_DIR: &str = "/opt/percona";

pub const ORCHESTRATOR_VERSION: &str = "3.2.6";
pub const PMM_SERVER_IMAGE: &str = "percona/pmm-server:2";

pub const RESTART_MYSQL: &str = "sudo systemctl restart mysql";
pub const START_ORCHESTRATOR: &str = "sudo systemctl start orchestrator";
pub const RESTART_ORCHESTRATOR: &str = "sudo systemctl restart orchestrator";

/// Package repository flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    PerconaServer,
    XtraDbCluster,
}

impl Distribution {
    /// `percona-release setup` product name
    fn release_product(&self) -> &'static str {
        match self {
            Distribution::PerconaServer => "ps80",
            Distribution::XtraDbCluster => "pxc80",
        }
    }

    /// Package answering debconf questions and listing versions
    pub fn server_package(&self) -> &'static str {
        match self {
            Distribution::PerconaServer => "percona-server-server",
            Distribution::XtraDbCluster => "percona-xtradb-cluster-server",
        }
    }

    fn listed_package(&self) -> &'static str {
        match self {
            Distribution::PerconaServer => "percona-server-server",
            Distribution::XtraDbCluster => "percona-xtradb-cluster",
        }
    }
}

/// Baseline OS prep
pub fn init() -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo apt-get update
sudo DEBIAN_FRONTEND=noninteractive apt-get upgrade -y

sudo mkdir -p {dir}
sudo chown ubuntu {dir}
"#,
        dir = STAGING_DIR
    )
}

/// Percona repository plus preseeded root password
pub fn configure_repository(distribution: Distribution, root_password: &str) -> String {
    let package = distribution.server_package();
    let password = shell_quote(root_password);
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo DEBIAN_FRONTEND=noninteractive apt-get install -y gnupg2 curl wget lsb-release debconf-utils net-tools
wget -q https://repo.percona.com/apt/percona-release_latest.generic_all.deb -O percona-release.deb
sudo dpkg -i percona-release.deb
rm percona-release.deb

sudo apt-get update
sudo percona-release setup {product}

AUTH_OVERRIDE="select Use Strong Password Encryption (RECOMMENDED)"
echo "{package} {package}/re-root-pass password "{password} | sudo debconf-set-selections
echo "{package} {package}/root-pass password "{password} | sudo debconf-set-selections
echo "{package} {package}/default-auth-override ${{AUTH_OVERRIDE}}" | sudo debconf-set-selections
"#,
        product = distribution.release_product(),
        package = package,
        password = password,
    )
}

/// `Version:` lines of the server package
pub fn list_versions(distribution: Distribution) -> String {
    format!(
        "apt-cache show {} | grep '^Version:'",
        distribution.listed_package()
    )
}

pub fn install_percona_server(version: &str) -> String {
    format!(
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y \
         percona-server-client={v} percona-server-common={v} percona-server-server={v}",
        v = version
    )
}

/// The repository versions carry a `1:` epoch that the listing strips
pub fn install_xtradb_cluster(version: &str) -> String {
    format!(
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y \
         percona-xtradb-cluster-common=1:{v} percona-xtradb-cluster-server=1:{v} \
         percona-xtradb-cluster-client=1:{v} percona-xtradb-cluster=1:{v}",
        v = version
    )
}

pub fn install_myrocks(version: &str, root_password: &str) -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo DEBIAN_FRONTEND=noninteractive apt-get install -y percona-server-rocksdb={version}
sudo ps-admin --enable-rocksdb -uroot -p{password}
"#,
        version = version,
        password = shell_quote(root_password)
    )
}

pub fn start_mysql(bootstrap: bool) -> &'static str {
    if bootstrap {
        "sudo systemctl start mysql@bootstrap.service"
    } else {
        "sudo systemctl start mysql"
    }
}

pub fn stop_mysql(bootstrap: bool) -> &'static str {
    if bootstrap {
        "sudo systemctl stop mysql@bootstrap.service"
    } else {
        "sudo systemctl stop mysql"
    }
}

pub fn install_pmm_client(server_url: &str) -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo percona-release disable all
sudo percona-release enable original release
sudo apt-get update
sudo DEBIAN_FRONTEND=noninteractive apt-get install -y pmm2-client
sudo pmm-admin config --server-insecure-tls --server-url={url}
"#,
        url = shell_quote(server_url)
    )
}

pub fn add_service_to_pmm(user: &str, password: &str, port: u16) -> String {
    format!(
        "sudo pmm-admin add mysql --query-source=slowlog --username={} --password={} --port={}",
        shell_quote(user),
        shell_quote(password),
        port
    )
}

fn orchestrator_package(name: &str) -> String {
    format!(
        "https://github.com/openark/orchestrator/releases/download/v{v}/{name}_{v}_amd64.deb",
        v = ORCHESTRATOR_VERSION,
        name = name
    )
}

pub fn install_orchestrator() -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo DEBIAN_FRONTEND=noninteractive apt-get install -y libonig5 libjq1 jq curl
curl --fail -sSL {url} -o orchestrator.deb
sudo dpkg -i orchestrator.deb
rm orchestrator.deb

sudo mkdir -p /etc/mysql /var/lib/orchestrator
"#,
        url = orchestrator_package("orchestrator")
    )
}

pub fn install_orchestrator_client() -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

sudo DEBIAN_FRONTEND=noninteractive apt-get install -y libonig5 libjq1 jq curl
curl --fail -sSL {url} -o orchestrator-client.deb
sudo dpkg -i orchestrator-client.deb
rm orchestrator-client.deb
"#,
        url = orchestrator_package("orchestrator-client")
    )
}

/// Register `host:port` with the orchestrator raft members at `api_urls`
pub fn orchestrator_discover(api_urls: &[String], host: &str, port: u16) -> String {
    format!(
        "ORCHESTRATOR_API={} orchestrator-client -c discover -i {}:{}",
        shell_quote(&api_urls.join(" ")),
        host,
        port
    )
}

/// Docker plus the PMM server container
pub fn install_pmm_server() -> String {
    format!(
        r#"#!/usr/bin/env bash
set -o errexit

curl -fsSL https://get.docker.com | sudo sh
sudo docker pull {image}
sudo docker create --volume /srv --name pmm-data {image} /bin/true
sudo docker run --detach --restart always \
    --publish 80:80 --publish 443:443 \
    --volumes-from pmm-data --name pmm-server {image}
"#,
        image = PMM_SERVER_IMAGE
    )
}

/// Copy `from` to `to` as root, owned by root
pub fn install_file(from: &str, to: &str) -> String {
    format!(
        "sudo mv {from} {to} && sudo chown root:root {to}",
        from = shell_quote(from),
        to = shell_quote(to)
    )
}

/// Copy a root-owned file into the staging area, writable by `ubuntu`
pub fn stage_file(from: &str, to: &str) -> String {
    format!(
        "sudo cp {from} {to} && sudo chown ubuntu {to}",
        from = shell_quote(from),
        to = shell_quote(to)
    )
}
