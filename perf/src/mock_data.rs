use std::sync::OnceLock;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

const FILLER: &str = "Lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor ";

const OWNERS: [(&str, u64); 4] = [
    ("octocat", 583231),
    ("hubot", 480938),
    ("monalisa", 2154829),
    ("defunkt", 2),
];

const REPOSITORIES: [&str; 8] = [
    "hello-world",
    "spoon-knife",
    "linguist",
    "git-consortium",
    "octocat.github.io",
    "boysenberry-repo-1",
    "test-repo-1",
    "dotfiles",
];

const TOPICS: [&str; 6] = ["octocat", "atom", "electron", "api", "storage", "benchmark"];

const USER_LINKS: [(&str, &str); 9] = [
    ("followers_url", "/followers"),
    ("following_url", "/following{/other_user}"),
    ("gists_url", "/gists{/gist_id}"),
    ("starred_url", "/starred{/owner}{/repo}"),
    ("subscriptions_url", "/subscriptions"),
    ("organizations_url", "/orgs"),
    ("repos_url", "/repos"),
    ("events_url", "/events{/privacy}"),
    ("received_events_url", "/received_events"),
];

const REPO_LINKS: [(&str, &str); 36] = [
    ("forks_url", "/forks"),
    ("keys_url", "/keys{/key_id}"),
    ("collaborators_url", "/collaborators{/collaborator}"),
    ("teams_url", "/teams"),
    ("hooks_url", "/hooks"),
    ("issue_events_url", "/issues/events{/number}"),
    ("events_url", "/events"),
    ("assignees_url", "/assignees{/user}"),
    ("branches_url", "/branches{/branch}"),
    ("tags_url", "/tags"),
    ("blobs_url", "/git/blobs{/sha}"),
    ("git_tags_url", "/git/tags{/sha}"),
    ("git_refs_url", "/git/refs{/sha}"),
    ("trees_url", "/git/trees{/sha}"),
    ("statuses_url", "/statuses/{sha}"),
    ("languages_url", "/languages"),
    ("stargazers_url", "/stargazers"),
    ("contributors_url", "/contributors"),
    ("subscribers_url", "/subscribers"),
    ("subscription_url", "/subscription"),
    ("commits_url", "/commits{/sha}"),
    ("git_commits_url", "/git/commits{/sha}"),
    ("comments_url", "/comments{/number}"),
    ("issue_comment_url", "/issues/comments{/number}"),
    ("contents_url", "/contents/{+path}"),
    ("compare_url", "/compare/{base}...{head}"),
    ("merges_url", "/merges"),
    ("archive_url", "/{archive_format}{/ref}"),
    ("downloads_url", "/downloads"),
    ("issues_url", "/issues{/number}"),
    ("pulls_url", "/pulls{/number}"),
    ("milestones_url", "/milestones{/number}"),
    ("notifications_url", "/notifications{?since,all,participating}"),
    ("labels_url", "/labels{/name}"),
    ("releases_url", "/releases{/id}"),
    ("deployments_url", "/deployments"),
];

/// Number of repositories in [`fake_github_response`], sized to serialize to roughly 70KB.
pub const GITHUB_RESPONSE_LEN: usize = 13;

/// Deterministic ASCII string of `size_kb * 1024` bytes, rounded to the nearest byte.
pub fn generate_string(size_kb: f64) -> String {
    let len = (size_kb * 1024.0).round().max(0.0) as usize;
    FILLER.chars().cycle().take(len).collect()
}

pub fn generate_random_string(bytes: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(bytes)
        .map(char::from)
        .collect()
}

/// A fixed "list repositories" API response.
pub fn fake_github_response() -> &'static Value {
    static RESPONSE: OnceLock<Value> = OnceLock::new();
    RESPONSE.get_or_init(|| Value::Array((0..GITHUB_RESPONSE_LEN).map(repository).collect()))
}

fn user(login: &str, id: u64) -> Value {
    let api = format!("https://api.github.com/users/{login}");
    let mut user = json!({
        "login": login,
        "id": id,
        "node_id": format!("MDQ6VXNlcj{id}"),
        "avatar_url": format!("https://avatars.githubusercontent.com/u/{id}?v=4"),
        "gravatar_id": "",
        "url": api,
        "html_url": format!("https://github.com/{login}"),
        "type": "User",
        "site_admin": false,
    });
    if let Value::Object(fields) = &mut user {
        fields.extend(
            USER_LINKS
                .iter()
                .map(|(field, suffix)| (field.to_string(), Value::String(format!("{api}{suffix}")))),
        );
    }
    user
}

fn repository(index: usize) -> Value {
    let (login, owner_id) = OWNERS[index % OWNERS.len()];
    let name = format!("{}-{index}", REPOSITORIES[index % REPOSITORIES.len()]);
    let id = 1296269 + index as u64 * 7919;
    let full_name = format!("{login}/{name}");
    let api = format!("https://api.github.com/repos/{full_name}");
    let created = format!("2011-{:02}-{:02}T20:39:36Z", index % 12 + 1, index % 28 + 1);
    let language = if index % 2 == 0 { "Rust" } else { "TypeScript" };
    let topics = &TOPICS[..index % TOPICS.len() + 1];

    let mut repo = json!({
        "id": id,
        "node_id": format!("MDEwOlJlcG9zaXRvcnk{id}"),
        "name": name,
        "full_name": full_name,
        "private": false,
        "owner": user(login, owner_id),
        "html_url": format!("https://github.com/{full_name}"),
        "description": format!("{} number {index}, kept around as a fixture.", FILLER.trim()),
        "fork": index % 3 == 0,
        "url": api,
        "git_url": format!("git://github.com/{full_name}.git"),
        "ssh_url": format!("git@github.com:{full_name}.git"),
        "clone_url": format!("https://github.com/{full_name}.git"),
        "svn_url": format!("https://svn.github.com/{full_name}"),
        "mirror_url": null,
        "homepage": "https://github.com",
        "language": language,
        "size": 108 + index * 31,
        "forks_count": 9 * index,
        "stargazers_count": 80 + index * 13,
        "watchers_count": 80 + index * 13,
        "open_issues_count": index % 5,
        "is_template": false,
        "has_issues": true,
        "has_projects": true,
        "has_wiki": index % 2 == 1,
        "has_pages": false,
        "has_downloads": true,
        "archived": false,
        "disabled": false,
        "visibility": "public",
        "default_branch": "main",
        "topics": topics,
        "permissions": { "admin": false, "push": false, "pull": true },
        "license": {
            "key": "mit",
            "name": "MIT License",
            "url": "https://api.github.com/licenses/mit",
            "spdx_id": "MIT",
            "node_id": "MDc6TGljZW5zZW1pdA==",
        },
        "created_at": created,
        "updated_at": "2011-01-26T19:14:43Z",
        "pushed_at": "2011-01-26T19:06:43Z",
    });
    if let Value::Object(fields) = &mut repo {
        fields.extend(
            REPO_LINKS
                .iter()
                .map(|(field, suffix)| (field.to_string(), Value::String(format!("{api}{suffix}")))),
        );
    }
    repo
}
