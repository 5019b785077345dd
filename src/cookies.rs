// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::browser::BrowserSession;
use crate::probe::HttpProbe;

/// Synchronizes cookies observed by the browser into the probe's cookie
/// jar, one-way, after every successful browser navigation.
///
/// The two clients keep separate jars by design -- they serve different
/// transport models -- so this is the only point where state crosses
/// from one to the other.
pub fn sync_browser_cookies_into_probe<B, P>(session: &B, probe: &P) -> Result<(), B::Error>
where
    B: BrowserSession,
    P: HttpProbe,
{
    for cookie in session.cookies()? {
        probe.sync_cookie(&cookie);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::browser::{BrowserCookie, NavigationRecord};
    use crate::probe::ReqwestProbe;
    use url::Url;

    struct FakeSession {
        cookies: Vec<BrowserCookie>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake session error")]
    struct FakeError;

    impl BrowserSession for FakeSession {
        type Error = FakeError;

        fn open(&mut self, _url: &Url) -> Result<(), Self::Error> {
            Ok(())
        }

        fn current_url(&self) -> Result<Url, Self::Error> {
            Err(FakeError)
        }

        fn cookies(&self) -> Result<Vec<BrowserCookie>, Self::Error> {
            Ok(self.cookies.clone())
        }

        fn start_capture(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn last_navigation(&self) -> Result<Option<NavigationRecord>, Self::Error> {
            Ok(None)
        }

        fn eval(&mut self, _script: &str) -> Result<String, Self::Error> {
            Ok(String::new())
        }

        fn close(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn syncs_every_cookie_into_the_probe() {
        let session = FakeSession {
            cookies: vec![BrowserCookie {
                name: "session".into(),
                value: "abc".into(),
                domain: "example.com".into(),
                path: "/".into(),
                expires: None,
                secure: true,
                http_only: true,
            }],
        };
        let probe = ReqwestProbe::new("test-agent/1.0").unwrap();
        assert!(sync_browser_cookies_into_probe(&session, &probe).is_ok());
    }
}
